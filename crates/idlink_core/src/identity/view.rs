//! Consolidated identity view.
//!
//! # Responsibility
//! - Assemble the externally visible identity from a primary and its
//!   secondaries.
//!
//! # Invariants
//! - The primary's email/phone come first when present.
//! - Every value and every secondary id appears once.
//! - Output order follows the order of the secondaries passed in.

use crate::model::contact::{Contact, ContactId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Consolidated identity for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

/// Response envelope: `{"contact": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: ContactView,
}

impl From<ContactView> for IdentifyResponse {
    fn from(contact: ContactView) -> Self {
        Self { contact }
    }
}

/// Builds the view for `primary` and its `secondaries`.
pub fn build_view(primary: &Contact, secondaries: &[Contact]) -> ContactView {
    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();
    push_unique(&mut emails, primary.email.as_deref());
    push_unique(&mut phone_numbers, primary.phone_number.as_deref());

    let mut seen_ids = HashSet::new();
    let mut secondary_contact_ids = Vec::new();
    for secondary in secondaries.iter().filter(|row| row.id != primary.id) {
        push_unique(&mut emails, secondary.email.as_deref());
        push_unique(&mut phone_numbers, secondary.phone_number.as_deref());
        if seen_ids.insert(secondary.id) {
            secondary_contact_ids.push(secondary.id);
        }
    }

    ContactView {
        primary_contact_id: primary.id,
        emails,
        phone_numbers,
        secondary_contact_ids,
    }
}

fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    match value {
        Some(value) if !value.is_empty() && !values.iter().any(|known| known == value) => {
            values.push(value.to_string());
        }
        _ => {}
    }
}
