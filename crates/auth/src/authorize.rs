use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AuthContext, Role, has_min_role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("not a member of this project")]
    NoMembership,

    #[error("forbidden: '{action}' requires role '{required}', caller has '{actual}'")]
    Forbidden {
        action: ProjectAction,
        required: Role,
        actual: Role,
    },
}

/// Things a caller can do inside a project, each gated by a minimum role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectAction {
    ViewProject,
    ViewJobs,
    Annotate,
    ManageJobs,
    ManageMembers,
    DeleteProject,
}

impl ProjectAction {
    pub const ALL: [ProjectAction; 6] = [
        ProjectAction::ViewProject,
        ProjectAction::ViewJobs,
        ProjectAction::Annotate,
        ProjectAction::ManageJobs,
        ProjectAction::ManageMembers,
        ProjectAction::DeleteProject,
    ];

    pub fn minimum_role(self) -> Role {
        match self {
            ProjectAction::ViewProject => Role::Guest,
            ProjectAction::ViewJobs | ProjectAction::Annotate => Role::Annotator,
            ProjectAction::ManageJobs | ProjectAction::ManageMembers => Role::Manager,
            ProjectAction::DeleteProject => Role::Admin,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectAction::ViewProject => "view_project",
            ProjectAction::ViewJobs => "view_jobs",
            ProjectAction::Annotate => "annotate",
            ProjectAction::ManageJobs => "manage_jobs",
            ProjectAction::ManageMembers => "manage_members",
            ProjectAction::DeleteProject => "delete_project",
        }
    }
}

impl core::fmt::Display for ProjectAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorize a caller for an action in the project carried by `ctx`.
///
/// - No IO
/// - No panics
/// - Fails closed: no membership means no access
pub fn authorize(ctx: &AuthContext, action: ProjectAction) -> Result<(), AuthzError> {
    let actual = ctx.role().ok_or(AuthzError::NoMembership)?;
    let required = action.minimum_role();

    if has_min_role(actual, required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            action,
            required,
            actual,
        })
    }
}

/// Every action the given role unlocks, in a stable order.
pub fn allowed_actions(role: Option<Role>) -> Vec<ProjectAction> {
    let Some(role) = role else {
        return Vec::new();
    };

    ProjectAction::ALL
        .into_iter()
        .filter(|action| has_min_role(role, action.minimum_role()))
        .collect()
}
