use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use annotate_core::DomainError;

/// Message sent with every 500; details stay in the logs.
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// A failure raised by a route operation.
///
/// `status: None` means the failure was unexpected and is reported as a
/// generic 500.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OperationError {
    pub status: Option<StatusCode>,
    pub message: String,
}

impl OperationError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }
}

impl From<DomainError> for OperationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                Self::new(StatusCode::BAD_REQUEST, msg)
            }
            DomainError::NotFound(what) => Self::not_found(format!("{what} not found")),
            DomainError::Conflict(msg) => Self::conflict(msg),
            DomainError::Unauthorized => Self::new(StatusCode::FORBIDDEN, "Unauthorized"),
            DomainError::Storage(msg) => Self::internal(msg),
        }
    }
}

/// Everything a route can fail with, in dispatch order.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("invalid body: {0}")]
    InvalidBody(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("response failed schema validation: {0}")]
    ResponseSchema(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidParams(_) | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Operation(err) => err.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::ResponseSchema(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The text the client sees. Server-side failures never leak details.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Unauthenticated => "Authentication required".to_string(),
            ApiError::InvalidParams(detail) => format!("Invalid parameters: {detail}"),
            ApiError::InvalidBody(detail) => format!("Invalid request body: {detail}"),
            ApiError::Forbidden(reason) => reason.clone(),
            ApiError::Operation(OperationError {
                status: Some(_),
                message,
            }) => message.clone(),
            ApiError::Operation(_) | ApiError::ResponseSchema(_) | ApiError::Internal(_) => {
                INTERNAL_MESSAGE.to_string()
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Operation(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        json_error(status, self.public_message())
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Flatten validator output into `field: message` pairs, nested fields
/// joined with dots.
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut out = Vec::new();
    collect_validation_errors(errors, "", &mut out);
    out.sort();
    out.join("; ")
}

fn collect_validation_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(errs) => {
                for err in errs {
                    let msg = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    out.push(format!("{path}: {msg}"));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_validation_errors(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validation_errors(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::validation("bad"), Some(StatusCode::BAD_REQUEST)),
            (DomainError::not_found("job"), Some(StatusCode::NOT_FOUND)),
            (DomainError::conflict("archived"), Some(StatusCode::CONFLICT)),
            (DomainError::Unauthorized, Some(StatusCode::FORBIDDEN)),
            (DomainError::storage("disk"), None),
        ];
        for (err, status) in cases {
            assert_eq!(OperationError::from(err).status, status);
        }
    }

    #[test]
    fn server_errors_hide_details() {
        let err = ApiError::Operation(OperationError::internal("connection reset by db-7"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), INTERNAL_MESSAGE);

        let err = ApiError::ResponseSchema("id: range".to_string());
        assert_eq!(err.public_message(), INTERNAL_MESSAGE);
    }

    #[test]
    fn operation_status_and_message_are_kept() {
        let err = ApiError::from(OperationError::not_found("job not found"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "job not found");
    }
}
