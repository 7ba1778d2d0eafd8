//! Domain model for contact identity resolution.
//!
//! # Responsibility
//! - Define the persisted `Contact` record and its link semantics.
//! - Define the incoming `ContactFact` and its validation rules.
//!
//! # Invariants
//! - A contact is `primary` iff it has no `linked_id`.
//! - Contacts are never hard-deleted; `deleted_at` is a tombstone only.

pub mod contact;
pub mod fact;
