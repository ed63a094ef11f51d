//! Route parameter coercion.
//!
//! Path segments and query strings only ever carry text. Before a route's
//! param type sees them, every key listed in [`PARAM_SCHEMA`] is converted
//! to its declared kind; unknown keys are dropped.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use validator::Validate;

use crate::app::errors::{ApiError, describe_validation_errors};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Text,
}

/// Every parameter name any route understands.
pub const PARAM_SCHEMA: &[(&str, ParamKind)] = &[
    ("projectId", ParamKind::Integer),
    ("jobId", ParamKind::Integer),
    ("unitId", ParamKind::Integer),
    ("annotatorId", ParamKind::Integer),
    ("afterId", ParamKind::Integer),
    ("beforeId", ParamKind::Integer),
    ("pageSize", ParamKind::Integer),
    ("userId", ParamKind::Text),
    ("query", ParamKind::Text),
];

pub fn kind_of(name: &str) -> Option<ParamKind> {
    PARAM_SCHEMA
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, kind)| *kind)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("{name} must be an integer, got '{value}'")]
    NotAnInteger { name: String, value: String },
}

/// Convert raw string params into typed JSON values.
///
/// An empty integer param (`?afterId=`) counts as absent.
pub fn coerce_params(raw: &HashMap<String, String>) -> Result<Map<String, Value>, ParamError> {
    let mut out = Map::new();

    for (name, kind) in PARAM_SCHEMA {
        let Some(value) = raw.get(*name) else {
            continue;
        };

        let coerced = match kind {
            ParamKind::Integer => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let n = trimmed
                    .parse::<i64>()
                    .map_err(|_| ParamError::NotAnInteger {
                        name: name.to_string(),
                        value: value.clone(),
                    })?;
                Value::from(n)
            }
            ParamKind::Text => Value::String(value.clone()),
        };
        out.insert(name.to_string(), coerced);
    }

    Ok(out)
}

/// Coerce, deserialize and validate params for a route.
pub fn parse_params<P>(raw: &HashMap<String, String>) -> Result<P, ApiError>
where
    P: DeserializeOwned + Validate,
{
    let coerced = coerce_params(raw).map_err(|e| ApiError::InvalidParams(e.to_string()))?;
    let params: P = serde_json::from_value(Value::Object(coerced))
        .map_err(|e| ApiError::InvalidParams(e.to_string()))?;
    params
        .validate()
        .map_err(|e| ApiError::InvalidParams(describe_validation_errors(&e)))?;
    Ok(params)
}
