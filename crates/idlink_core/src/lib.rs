//! Core identity resolution for idlink.
//! This crate is the single source of truth for contact-clustering invariants.

pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use identity::view::{build_view, ContactView, IdentifyResponse};
pub use identity::{cluster_view, resolve, Resolution};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::contact::{Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact};
pub use model::fact::{ContactFact, FactValidationError, ValidatedFact};
pub use repo::contact_repo::{ContactRepository, RepoError, RepoResult, SqliteContactRepository};
pub use repo::memory_contact_repo::InMemoryContactRepository;
pub use service::identity_service::{
    IdentifyError, IdentifyOptions, IdentityService, DEFAULT_CONFLICT_RETRIES,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
