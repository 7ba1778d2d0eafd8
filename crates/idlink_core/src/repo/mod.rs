//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the contact store contract used by the identity pipeline.
//! - Isolate SQLite query details from reconciliation logic.
//! - Provide an in-memory double with the same contract.
//!
//! # Invariants
//! - Repository writes validate rows before persistence.
//! - Uniqueness races surface as `RepoError::Conflict`, distinct from
//!   transport errors.

pub mod contact_repo;
pub mod memory_contact_repo;
