use annotate_core::{Email, ProjectId};

use crate::Role;

/// Who is calling and what they may do in the project the request addresses.
///
/// Built fresh for every request from the authenticated identity and a role
/// lookup; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthContext {
    email: Option<Email>,
    project_id: Option<ProjectId>,
    role: Option<Role>,
}

impl AuthContext {
    pub fn new(email: Option<Email>, project_id: Option<ProjectId>, role: Option<Role>) -> Self {
        Self {
            email,
            project_id,
            role,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn email(&self) -> Option<&Email> {
        self.email.as_ref()
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    /// Role in [`Self::project_id`]; `None` when the caller is not a member.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// A missing membership satisfies no minimum, not even `guest`.
    pub fn has_min_role(&self, minimum: Role) -> bool {
        self.role
            .is_some_and(|role| crate::has_min_role(role, minimum))
    }
}
