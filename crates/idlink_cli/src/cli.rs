//! Command-line configuration.
//!
//! # Responsibility
//! - Declare the `idlink` subcommands and their arguments.
//! - Read store, logging and retry settings from flags or `IDLINK_*` env vars.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "idlink", about = "Contact identity reconciliation", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// SQLite database file
    #[arg(long, global = true, env = "IDLINK_DB_PATH", default_value = "idlink.sqlite3")]
    pub db: PathBuf,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true, env = "IDLINK_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, global = true, env = "IDLINK_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Extra attempts after a concurrent writer stores the same contact
    #[arg(
        long,
        global = true,
        env = "IDLINK_CONFLICT_RETRIES",
        default_value_t = idlink_core::DEFAULT_CONFLICT_RETRIES
    )]
    pub conflict_retries: u32,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve one contact fact and print the consolidated identity
    Identify {
        #[arg(long, conflicts_with = "json")]
        email: Option<String>,

        #[arg(long = "phone", conflicts_with = "json")]
        phone_number: Option<String>,

        /// Fact as JSON, e.g. '{"email":"a@x.com","phoneNumber":"123"}'
        #[arg(long)]
        json: Option<String>,
    },

    /// Resolve newline-delimited JSON facts read from stdin
    Batch,

    /// Print the identity containing a contact id without changing anything
    Show {
        /// Any contact id in the cluster
        id: i64,
    },
}
