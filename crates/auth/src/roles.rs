use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Project role, ordered from least to most privileged.
///
/// Every role can do everything the roles below it can. The derived `Ord`
/// follows declaration order, so keep the variants sorted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Annotator,
    Manager,
    Admin,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 4] = [Role::Guest, Role::Annotator, Role::Manager, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Annotator => "annotator",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Does `actual` meet or exceed `minimum`?
pub fn has_min_role(actual: Role, minimum: Role) -> bool {
    actual >= minimum
}

/// Same check for a role that arrives as a raw string (e.g. from storage).
///
/// Unrecognized strings never satisfy any minimum.
pub fn role_satisfies(actual: &str, minimum: Role) -> bool {
    actual
        .parse::<Role>()
        .is_ok_and(|role| has_min_role(role, minimum))
}
