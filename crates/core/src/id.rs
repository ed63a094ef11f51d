//! Strongly-typed surrogate identifiers.
//!
//! Ids are assigned by the store, are strictly positive and increase
//! monotonically. They are opaque to clients; the only thing a client may do
//! with one is hand it back (including as a pagination cursor).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a project (the authorization boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(i64);

/// Identifier of an annotation job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

/// Identifier of a unit (one item to annotate) inside a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(i64);

/// Identifier of an annotator registered on a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotatorId(i64);

macro_rules! impl_serial_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl TryFrom<i64> for $t {
            type Error = DomainError;

            fn try_from(raw: i64) -> Result<Self, Self::Error> {
                if raw < 1 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be positive, got {}",
                        $name, raw
                    )));
                }
                Ok(Self(raw))
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self::try_from(raw)
            }
        }
    };
}

impl_serial_newtype!(ProjectId, "ProjectId");
impl_serial_newtype!(JobId, "JobId");
impl_serial_newtype!(UnitId, "UnitId");
impl_serial_newtype!(AnnotatorId, "AnnotatorId");
