use std::sync::Arc;

use axum::Router;

use annotate_auth::allowed_actions;
use annotate_core::Email;

use crate::app::AppState;
use crate::app::dto::{CreateProjectRequest, MeResponse, ProjectPath, ProjectSummary};
use crate::app::errors::OperationError;
use crate::app::services::InMemoryStore;
use crate::authz::require_member;
use crate::context::RouteInput;
use crate::route::{self, NoBody, NoParams, RouteSpec};

pub fn router(store: Arc<InMemoryStore>) -> Router<AppState> {
    Router::new()
        .route("/projects", route::post(create_project(store)))
        .route("/projects/:projectId/me", route::get(me()))
}

/// Any authenticated caller may create a project and becomes its admin.
pub fn create_project(store: Arc<InMemoryStore>) -> RouteSpec<NoParams, CreateProjectRequest, ProjectSummary> {
    RouteSpec::new(
        "create_project",
        move |email: Option<Email>, input: RouteInput<NoParams, CreateProjectRequest>| {
            let store = store.clone();
            async move {
                let creator = super::caller(email)?;
                store
                    .create_project(&creator, &input.body.name)
                    .map_err(OperationError::from)
            }
        },
    )
}

/// The caller's own membership in a project.
pub fn me() -> RouteSpec<ProjectPath, NoBody, MeResponse> {
    RouteSpec::new(
        "project_me",
        |email: Option<Email>, input: RouteInput<ProjectPath, NoBody>| async move {
            let email = super::caller(email)?;
            let role = super::caller_role(&input)?;

            Ok(MeResponse {
                email: email.to_string(),
                project_id: input.params.project_id,
                role,
                actions: allowed_actions(Some(role)),
            })
        },
    )
    .authorize(require_member())
}
