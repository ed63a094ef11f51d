//! Value objects: compared by value, never by identity.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A caller's email address, the identity every authorization decision keys on.
///
/// Normalized to lowercase with surrounding whitespace removed, so two spellings
/// of the same address compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let normalized = raw.as_ref().trim().to_lowercase();

        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(DomainError::validation("email must contain '@'"));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(DomainError::validation(format!(
                "malformed email address '{normalized}'"
            )));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("email must not contain whitespace"));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}
