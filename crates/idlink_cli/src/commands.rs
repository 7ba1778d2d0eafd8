//! Command handlers over one identity service.

use crate::envelope::{
    render_identify_error, render_internal, render_invalid_request, render_view, Outcome,
    Rendered,
};
use idlink_core::{ContactFact, ContactRepository, IdentityService};
use log::{error, info};
use std::io::{BufRead, Write};

pub fn identify_fact<R: ContactRepository>(
    service: &IdentityService<R>,
    fact: &ContactFact,
) -> Rendered {
    match service.identify(fact) {
        Ok(view) => render_view(view),
        Err(err) => render_identify_error(&err),
    }
}

/// Decodes `body` as a fact and resolves it.
pub fn identify_json<R: ContactRepository>(service: &IdentityService<R>, body: &str) -> Rendered {
    match serde_json::from_str::<ContactFact>(body) {
        Ok(fact) => identify_fact(service, &fact),
        Err(err) => render_invalid_request(&err),
    }
}

pub fn show<R: ContactRepository>(service: &IdentityService<R>, id: i64) -> Rendered {
    match service.show(id) {
        Ok(view) => render_view(view),
        Err(err) => render_identify_error(&err),
    }
}

/// Resolves one JSON fact per input line, writing one response line each.
///
/// Blank lines are skipped. A failing line does not stop the batch; the
/// returned outcome is the worst seen.
pub fn run_batch<R, I, O>(service: &IdentityService<R>, input: I, output: &mut O) -> Outcome
where
    R: ContactRepository,
    I: BufRead,
    O: Write,
{
    let mut worst = Outcome::Ok;
    let mut processed = 0usize;
    let mut failed = 0usize;

    for line in input.lines() {
        let rendered = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => identify_json(service, &line),
            Err(err) => render_internal(&err),
        };
        processed += 1;
        if rendered.outcome != Outcome::Ok {
            failed += 1;
        }
        worst = worst.max(rendered.outcome);

        if let Err(err) = writeln!(output, "{}", rendered.line) {
            error!(
                "event=batch module=cli status=error processed={} error_code=write_failed error={}",
                processed, err
            );
            return Outcome::ServerError;
        }
    }

    info!(
        "event=batch module=cli status=ok processed={} failed={}",
        processed, failed
    );
    worst
}
