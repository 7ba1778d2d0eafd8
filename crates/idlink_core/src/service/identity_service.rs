//! Identity use-case service.
//!
//! # Responsibility
//! - Validate incoming facts before any store access.
//! - Run the identity pipeline inside one repository transaction.
//! - Retry the pipeline when an insert loses a uniqueness race.
//! - Emit metadata-only `identify` log events.
//!
//! # Invariants
//! - A failed attempt leaves no partial writes behind.
//! - Conflicts are retried at most `IdentifyOptions::conflict_retries` times.
//! - Log lines carry ids and counts, never email or phone values.

use crate::identity::view::ContactView;
use crate::identity::{cluster_view, resolve, Resolution};
use crate::model::contact::ContactId;
use crate::model::fact::{ContactFact, FactValidationError};
use crate::repo::contact_repo::{ContactRepository, RepoError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Retries granted when a concurrent writer inserts the same pair first.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 1;

/// Service error for identity use-cases.
#[derive(Debug)]
pub enum IdentifyError {
    /// Caller input was rejected before store access.
    Validation(FactValidationError),
    /// Requested contact does not exist.
    NotFound(ContactId),
    /// Uniqueness conflicts persisted through every retry.
    ConflictExhausted { attempts: u32 },
    /// Persistence failure; the transaction was rolled back.
    Store(RepoError),
}

impl IdentifyError {
    /// Whether the caller, not the server, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_fact",
            Self::NotFound(_) => "not_found",
            Self::ConflictExhausted { .. } => "conflict_exhausted",
            Self::Store(_) => "store_error",
        }
    }
}

impl Display for IdentifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::ConflictExhausted { attempts } => write!(
                f,
                "contact kept conflicting with concurrent writes after {attempts} attempts"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IdentifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::NotFound(_) | Self::ConflictExhausted { .. } => None,
        }
    }
}

impl From<FactValidationError> for IdentifyError {
    fn from(value: FactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for IdentifyError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Tunables for `IdentityService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifyOptions {
    /// Extra attempts after a uniqueness conflict.
    pub conflict_retries: u32,
}

impl Default for IdentifyOptions {
    fn default() -> Self {
        Self {
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

/// Use-case service wrapper for identity resolution.
pub struct IdentityService<R: ContactRepository> {
    repo: R,
    options: IdentifyOptions,
}

impl<R: ContactRepository> IdentityService<R> {
    /// Creates a service with default options.
    pub fn new(repo: R) -> Self {
        Self::with_options(repo, IdentifyOptions::default())
    }

    pub fn with_options(repo: R, options: IdentifyOptions) -> Self {
        Self { repo, options }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Resolves `fact` and returns the consolidated identity.
    ///
    /// # Errors
    /// - `Validation` for missing or malformed channels (no store access).
    /// - `ConflictExhausted` when the retry budget runs out.
    /// - `Store` for any other persistence failure.
    pub fn identify(&self, fact: &ContactFact) -> Result<ContactView, IdentifyError> {
        self.identify_detailed(fact).map(|resolution| resolution.view)
    }

    /// Same as `identify`, returning the reconciliation details as well.
    pub fn identify_detailed(&self, fact: &ContactFact) -> Result<Resolution, IdentifyError> {
        let started_at = Instant::now();
        let request_id = Uuid::new_v4();

        let fact = match fact.validate() {
            Ok(fact) => fact,
            Err(err) => {
                warn!(
                    "event=identify module=service status=rejected request_id={} error_code=invalid_fact reason=\"{}\"",
                    request_id, err
                );
                return Err(err.into());
            }
        };

        let max_attempts = self.options.conflict_retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.repo.transaction(|repo| resolve(repo, &fact)) {
                Ok(resolution) => {
                    info!(
                        "event=identify module=service status=ok request_id={} attempt={} primary_id={} matched={} cluster_size={} demoted={} relinked={} cascaded={} created={} duration_ms={}",
                        request_id,
                        attempt,
                        resolution.view.primary_contact_id,
                        resolution.matched,
                        resolution.cluster_size,
                        resolution
                            .reconciliation
                            .as_ref()
                            .map_or(0, |outcome| outcome.demoted.len()),
                        resolution
                            .reconciliation
                            .as_ref()
                            .map_or(0, |outcome| outcome.relinked.len()),
                        resolution
                            .reconciliation
                            .as_ref()
                            .map_or(0, |outcome| outcome.cascaded),
                        resolution.created_contact(),
                        started_at.elapsed().as_millis()
                    );
                    return Ok(resolution);
                }
                Err(RepoError::Conflict) if attempt < max_attempts => {
                    warn!(
                        "event=identify_conflict module=service status=retry request_id={} attempt={}",
                        request_id, attempt
                    );
                }
                Err(RepoError::Conflict) => {
                    error!(
                        "event=identify module=service status=error request_id={} attempt={} error_code=conflict_exhausted duration_ms={}",
                        request_id,
                        attempt,
                        started_at.elapsed().as_millis()
                    );
                    return Err(IdentifyError::ConflictExhausted { attempts: attempt });
                }
                Err(err) => {
                    error!(
                        "event=identify module=service status=error request_id={} attempt={} error_code=store_error duration_ms={} error={}",
                        request_id,
                        attempt,
                        started_at.elapsed().as_millis(),
                        err
                    );
                    return Err(IdentifyError::Store(err));
                }
            }
        }
    }

    /// Read-only view of the cluster containing contact `id`.
    pub fn show(&self, id: ContactId) -> Result<ContactView, IdentifyError> {
        cluster_view(&self.repo, id).map_err(|err| match err {
            RepoError::NotFound(missing) => IdentifyError::NotFound(missing),
            other => IdentifyError::Store(other),
        })
    }
}
