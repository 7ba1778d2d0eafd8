//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validation, transactions and retries around the identity
//!   pipeline.
//! - Keep CLI/transport layers decoupled from storage details.

pub mod identity_service;
