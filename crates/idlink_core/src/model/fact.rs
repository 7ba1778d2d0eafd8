//! Incoming contact fact and its validation.
//!
//! # Responsibility
//! - Accept the wire shape of an identify request.
//! - Normalize and validate it into a `ValidatedFact` before store access.
//!
//! # Invariants
//! - Empty or whitespace-only values are treated as absent.
//! - A `ValidatedFact` always carries at least one channel.
//! - Matching stays exact: no case folding, no digit stripping.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MAX_EMAIL_CHARS: usize = 100;
pub const MAX_PHONE_CHARS: usize = 20;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ().\-]*[0-9][0-9 ().\-]*$").expect("valid phone regex"));

/// Validation errors for incoming facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactValidationError {
    /// Neither email nor phone number was supplied.
    MissingChannel,
    EmailTooLong,
    InvalidEmail,
    PhoneTooLong,
    InvalidPhone,
}

impl Display for FactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingChannel => write!(f, "either email or phoneNumber must be provided"),
            Self::EmailTooLong => {
                write!(f, "email must be at most {MAX_EMAIL_CHARS} characters")
            }
            Self::InvalidEmail => write!(f, "email is malformed"),
            Self::PhoneTooLong => {
                write!(f, "phoneNumber must be at most {MAX_PHONE_CHARS} characters")
            }
            Self::InvalidPhone => write!(f, "phoneNumber is malformed"),
        }
    }
}

impl Error for FactValidationError {}

/// Wire shape of an identify request.
///
/// `phoneNumber` accepts a JSON string or a non-negative JSON integer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_phone")]
    pub phone_number: Option<String>,
}

impl ContactFact {
    pub fn new(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
        }
    }

    /// Normalizes and validates this fact.
    ///
    /// # Errors
    /// - `MissingChannel` when both values are absent after trimming.
    /// - Length/shape errors for malformed email or phone values.
    pub fn validate(&self) -> Result<ValidatedFact, FactValidationError> {
        let email = normalize(self.email.as_deref());
        let phone_number = normalize(self.phone_number.as_deref());

        if email.is_none() && phone_number.is_none() {
            return Err(FactValidationError::MissingChannel);
        }
        if let Some(email) = email.as_deref() {
            if email.chars().count() > MAX_EMAIL_CHARS {
                return Err(FactValidationError::EmailTooLong);
            }
            if !EMAIL_RE.is_match(email) {
                return Err(FactValidationError::InvalidEmail);
            }
        }
        if let Some(phone) = phone_number.as_deref() {
            if phone.chars().count() > MAX_PHONE_CHARS {
                return Err(FactValidationError::PhoneTooLong);
            }
            if !PHONE_RE.is_match(phone) {
                return Err(FactValidationError::InvalidPhone);
            }
        }

        Ok(ValidatedFact {
            email,
            phone_number,
        })
    }
}

/// Fact that passed validation; the only input the identity pipeline accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFact {
    email: Option<String>,
    phone_number: Option<String>,
}

impl ValidatedFact {
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhoneInput {
    Text(String),
    Number(u64),
}

fn deserialize_phone<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<PhoneInput>::deserialize(deserializer)?;
    Ok(value.map(|input| match input {
        PhoneInput::Text(text) => text,
        PhoneInput::Number(number) => number.to_string(),
    }))
}
