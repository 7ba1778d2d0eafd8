//! `idlink` command-line entry point.
//!
//! # Responsibility
//! - Parse configuration from flags and environment.
//! - Open the store, run one command, print JSON envelopes to stdout.
//! - Exit with 0 on success, 2 for caller errors, 1 for server errors.

mod cli;
mod commands;
mod envelope;

use clap::Parser;
use cli::{Cli, Commands};
use envelope::{render_internal, Outcome, Rendered};
use idlink_core::db::open_db;
use idlink_core::{
    default_log_level, init_logging, ContactFact, IdentifyOptions, IdentityService,
    SqliteContactRepository,
};
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("idlink: {err}");
            return Outcome::ServerError.exit_code();
        }
    }

    run(cli).exit_code()
}

fn run(cli: Cli) -> Outcome {
    let conn = match open_db(&cli.db) {
        Ok(conn) => conn,
        Err(err) => return print(render_internal(&err)),
    };
    let service = IdentityService::with_options(
        SqliteContactRepository::new(&conn),
        IdentifyOptions {
            conflict_retries: cli.conflict_retries,
        },
    );

    match cli.command {
        Commands::Identify {
            json: Some(body), ..
        } => print(commands::identify_json(&service, &body)),
        Commands::Identify {
            email,
            phone_number,
            json: None,
        } => print(commands::identify_fact(
            &service,
            &ContactFact::new(email, phone_number),
        )),
        Commands::Batch => {
            let stdin = io::stdin();
            let stdout = io::stdout();
            let mut output = stdout.lock();
            let outcome = commands::run_batch(&service, stdin.lock(), &mut output);
            match output.flush() {
                Ok(()) => outcome,
                Err(_) => Outcome::ServerError,
            }
        }
        Commands::Show { id } => print(commands::show(&service, id)),
    }
}

fn print(rendered: Rendered) -> Outcome {
    let mut stdout = io::stdout().lock();
    match writeln!(stdout, "{}", rendered.line).and_then(|()| stdout.flush()) {
        Ok(()) => rendered.outcome,
        Err(_) => Outcome::ServerError,
    }
}
