//! Contact domain model.
//!
//! # Responsibility
//! - Define the canonical contact row shared by store, pipeline and view.
//! - Provide the total order used to pick a cluster's primary.
//!
//! # Invariants
//! - `id` is store-assigned and never reused.
//! - `link_precedence == Primary` iff `linked_id.is_none()`.
//! - A contact never links to itself.
//! - At least one of `email` / `phone_number` is present.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned contact identifier.
pub type ContactId = i64;

/// Role of a contact inside its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPrecedence {
    /// Canonical, oldest record of a cluster.
    Primary,
    /// Record linked to the cluster primary via `linked_id`.
    Secondary,
}

impl LinkPrecedence {
    /// Storage/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Parses the storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Validation errors for contact rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Neither email nor phone number is set.
    MissingChannel,
    /// A primary carries a `linked_id`.
    PrimaryWithLink(ContactId),
    /// A secondary has no `linked_id`.
    SecondaryWithoutLink(ContactId),
    /// A contact links to itself.
    SelfLink(ContactId),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingChannel => write!(f, "contact must carry an email or a phone number"),
            Self::PrimaryWithLink(id) => write!(f, "primary contact {id} must not be linked"),
            Self::SecondaryWithoutLink(id) => {
                write!(f, "secondary contact {id} must be linked to a primary")
            }
            Self::SelfLink(id) => write!(f, "contact {id} cannot link to itself"),
        }
    }
}

impl Error for ContactValidationError {}

/// Persisted contact record.
///
/// Serialized with camelCase field names to match the external schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Primary this record points to. `None` for primaries.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    /// Unix epoch milliseconds, set once at insertion.
    pub created_at: i64,
    /// Unix epoch milliseconds, refreshed on every mutation.
    pub updated_at: i64,
    /// Tombstone marker. Persisted, never interpreted.
    pub deleted_at: Option<i64>,
}

impl Contact {
    /// Checks link/precedence consistency and channel presence.
    pub fn validate(&self) -> Result<(), ContactValidationError> {
        if self.email.is_none() && self.phone_number.is_none() {
            return Err(ContactValidationError::MissingChannel);
        }
        match (self.link_precedence, self.linked_id) {
            (LinkPrecedence::Primary, Some(_)) => {
                Err(ContactValidationError::PrimaryWithLink(self.id))
            }
            (LinkPrecedence::Secondary, None) => {
                Err(ContactValidationError::SecondaryWithoutLink(self.id))
            }
            (LinkPrecedence::Secondary, Some(target)) if target == self.id => {
                Err(ContactValidationError::SelfLink(self.id))
            }
            _ => Ok(()),
        }
    }

    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    /// Returns whether this record is already a secondary of `primary_id`.
    pub fn is_secondary_of(&self, primary_id: ContactId) -> bool {
        self.link_precedence == LinkPrecedence::Secondary && self.linked_id == Some(primary_id)
    }

    /// Sort key for primary selection: oldest first, lowest id on ties.
    pub fn seniority(&self) -> (i64, ContactId) {
        (self.created_at, self.id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Insert payload for a contact row; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// `Some` inserts a secondary of that primary, `None` a fresh primary.
    pub linked_id: Option<ContactId>,
}

impl NewContact {
    /// Payload for a brand-new cluster primary.
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
        }
    }

    /// Payload for a secondary linked to `primary_id`.
    pub fn secondary(
        email: Option<String>,
        phone_number: Option<String>,
        primary_id: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary_id),
        }
    }

    pub fn link_precedence(&self) -> LinkPrecedence {
        if self.linked_id.is_some() {
            LinkPrecedence::Secondary
        } else {
            LinkPrecedence::Primary
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        if self.email.is_none() && self.phone_number.is_none() {
            return Err(ContactValidationError::MissingChannel);
        }
        Ok(())
    }
}
