use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;

use annotate_auth::Role;
use annotate_core::Email;

use crate::app::AppState;
use crate::app::errors::OperationError;
use crate::app::services::InMemoryStore;
use crate::authz::FORBIDDEN_MESSAGE;
use crate::context::RouteInput;

pub mod annotator;
pub mod jobs;
pub mod members;
pub mod projects;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router(store: Arc<InMemoryStore>) -> Router<AppState> {
    Router::new()
        .merge(projects::router(store.clone()))
        .merge(jobs::router(store.clone()))
        .merge(members::router(store))
        .merge(annotator::router())
}

/// The authenticated caller, for operations on routes that require one.
fn caller(email: Option<Email>) -> Result<Email, OperationError> {
    email.ok_or_else(|| OperationError::new(StatusCode::UNAUTHORIZED, "Authentication required"))
}

/// The role the dispatcher resolved for the caller. Operations never fall
/// back to a default role.
fn caller_role<P, B>(input: &RouteInput<P, B>) -> Result<Role, OperationError> {
    input
        .role
        .ok_or_else(|| OperationError::new(StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE))
}
