use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;

use annotate_auth::{AuthContext, ProjectAction};
use annotate_core::{Email, ProjectId};

use crate::app::AppState;
use crate::app::dto::{Member, MemberList, MemberPath, ProjectPath, SetRoleRequest};
use crate::app::errors::OperationError;
use crate::app::services::InMemoryStore;
use crate::authz::{FORBIDDEN_MESSAGE, require};
use crate::context::RouteInput;
use crate::route::{self, NoBody, RouteSpec};

pub fn router(store: Arc<InMemoryStore>) -> Router<AppState> {
    Router::new()
        .route("/projects/:projectId/users", route::get(list_members(store.clone())))
        .route("/projects/:projectId/users/:userId", route::patch(set_member_role(store)))
}

pub fn list_members(store: Arc<InMemoryStore>) -> RouteSpec<ProjectPath, NoBody, MemberList> {
    RouteSpec::new(
        "list_members",
        move |_email: Option<Email>, input: RouteInput<ProjectPath, NoBody>| {
            let store = store.clone();
            async move {
                store
                    .list_members(ProjectId::new(input.params.project_id))
                    .map_err(OperationError::from)
            }
        },
    )
    .authorize(require(ProjectAction::ManageMembers))
}

/// Nobody can hand out a role above their own.
fn grants_at_most_own_role(ctx: &AuthContext, input: &RouteInput<MemberPath, SetRoleRequest>) -> Option<String> {
    require(ProjectAction::ManageMembers)(ctx, input).or_else(|| {
        (!ctx.has_min_role(input.body.role)).then(|| FORBIDDEN_MESSAGE.to_string())
    })
}

/// Add a member or change a member's role. Members ranked above the caller
/// cannot be changed.
pub fn set_member_role(store: Arc<InMemoryStore>) -> RouteSpec<MemberPath, SetRoleRequest, Member> {
    RouteSpec::new(
        "set_member_role",
        move |_email: Option<Email>, input: RouteInput<MemberPath, SetRoleRequest>| {
            let store = store.clone();
            async move {
                let caller_role = super::caller_role(&input)?;
                let project_id = ProjectId::new(input.params.project_id);
                let target = Email::parse(&input.params.user_id)?;

                let target_role = store.role_of(&target, project_id)?;
                if target_role.is_some_and(|role| role > caller_role) {
                    return Err(OperationError::new(StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE));
                }

                store
                    .set_member_role(project_id, target, input.body.role)
                    .map_err(OperationError::from)
            }
        },
    )
    .authorize(grants_at_most_own_role)
}
