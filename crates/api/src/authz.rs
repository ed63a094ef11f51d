//! Route-level authorization rules.
//!
//! A rule looks at the caller's [`AuthContext`] and the parsed route input
//! and returns `Some(reason)` to deny. The role itself comes from a
//! [`RoleDirectory`] lookup done by the dispatcher.

use async_trait::async_trait;
use tracing::debug;

use annotate_auth::{AuthContext, ProjectAction, Role, authorize};
use annotate_core::{Email, ProjectId};

use crate::app::errors::OperationError;

/// Message returned with every 403.
pub const FORBIDDEN_MESSAGE: &str = "Unauthorized";

/// Where project roles live.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// The caller's role in `project_id`, `None` for non-members.
    async fn project_role(
        &self,
        email: &Email,
        project_id: ProjectId,
    ) -> Result<Option<Role>, OperationError>;
}

/// Deny unless the caller holds at least `minimum` in the addressed project.
pub fn require_role<I: 'static>(
    minimum: Role,
) -> impl Fn(&AuthContext, &I) -> Option<String> + Send + Sync + 'static {
    move |ctx: &AuthContext, _input: &I| {
        if ctx.has_min_role(minimum) {
            None
        } else {
            debug!(
                caller = ?ctx.email(),
                project = ?ctx.project_id(),
                required = %minimum,
                actual = ?ctx.role(),
                "role check failed"
            );
            Some(FORBIDDEN_MESSAGE.to_string())
        }
    }
}

/// Deny unless the caller's role unlocks `action`.
pub fn require<I: 'static>(
    action: ProjectAction,
) -> impl Fn(&AuthContext, &I) -> Option<String> + Send + Sync + 'static {
    move |ctx: &AuthContext, _input: &I| match authorize(ctx, action) {
        Ok(()) => None,
        Err(err) => {
            debug!(caller = ?ctx.email(), project = ?ctx.project_id(), %action, error = %err, "action denied");
            Some(FORBIDDEN_MESSAGE.to_string())
        }
    }
}

/// Deny non-members; any role will do.
pub fn require_member<I: 'static>()
-> impl Fn(&AuthContext, &I) -> Option<String> + Send + Sync + 'static {
    require_role(Role::Guest)
}
