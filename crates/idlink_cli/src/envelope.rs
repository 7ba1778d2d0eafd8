//! JSON response envelopes and exit codes.
//!
//! # Invariants
//! - Success prints `{"contact": {...}}`; failure prints
//!   `{"error": {"kind": "...", "message": "..."}}`.
//! - Server-side failures carry a generic message; the detail is logged.

use idlink_core::{ContactView, IdentifyError, IdentifyResponse};
use log::error;
use serde::Serialize;
use std::process::ExitCode;

const INTERNAL_MESSAGE: &str = "internal error while resolving contact";

/// Severity of one command result, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    Ok,
    ClientError,
    ServerError,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Ok => ExitCode::SUCCESS,
            Self::ClientError => ExitCode::from(2),
            Self::ServerError => ExitCode::from(1),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// One rendered response line plus its severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub line: String,
    pub outcome: Outcome,
}

pub fn render_view(view: ContactView) -> Rendered {
    Rendered {
        line: to_json(&IdentifyResponse::from(view)),
        outcome: Outcome::Ok,
    }
}

pub fn render_identify_error(err: &IdentifyError) -> Rendered {
    if err.is_client_error() {
        return render_error(err.code(), err.to_string(), Outcome::ClientError);
    }
    error!(
        "event=cli_request module=cli status=error error_code={} error={}",
        err.code(),
        err
    );
    render_error(err.code(), INTERNAL_MESSAGE.to_string(), Outcome::ServerError)
}

/// Request body could not be decoded into a fact.
pub fn render_invalid_request(err: &serde_json::Error) -> Rendered {
    render_error(
        "invalid_request",
        format!("request body is not a valid contact fact: {err}"),
        Outcome::ClientError,
    )
}

/// Failure outside the identity pipeline (store bootstrap, stdin).
pub fn render_internal(detail: &dyn std::fmt::Display) -> Rendered {
    error!("event=cli_request module=cli status=error error_code=internal error={detail}");
    render_error("internal", INTERNAL_MESSAGE.to_string(), Outcome::ServerError)
}

fn render_error(kind: &'static str, message: String, outcome: Outcome) -> Rendered {
    Rendered {
        line: to_json(&ErrorEnvelope {
            error: ErrorBody { kind, message },
        }),
        outcome,
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    // Envelopes hold only strings and integers, so encoding cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| {
        r#"{"error":{"kind":"internal","message":"response encoding failed"}}"#.to_string()
    })
}
