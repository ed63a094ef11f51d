//! Request/response shapes. Every type here doubles as its own schema via
//! `validator::Validate`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use annotate_auth::{ProjectAction, Role};
use annotate_core::{DomainResult, PageRequest, PaginationCursor, ProjectId};

use crate::route::ProjectScoped;

// --- Params -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPath {
    #[validate(range(min = 1))]
    pub project_id: i64,
}

impl ProjectScoped for ProjectPath {
    fn project_id(&self) -> Option<ProjectId> {
        Some(ProjectId::new(self.project_id))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "single_cursor_boundary"))]
pub struct ListJobsParams {
    #[validate(range(min = 1))]
    pub project_id: i64,
    pub after_id: Option<i64>,
    pub before_id: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<u32>,
    #[validate(length(max = 200))]
    pub query: Option<String>,
}

fn single_cursor_boundary(params: &ListJobsParams) -> Result<(), ValidationError> {
    if params.after_id.is_some() && params.before_id.is_some() {
        return Err(ValidationError::new("cursor")
            .with_message("at most one of afterId and beforeId may be given".into()));
    }
    Ok(())
}

impl ListJobsParams {
    pub fn page_request(&self) -> DomainResult<PageRequest> {
        let cursor = PaginationCursor {
            after_id: self.after_id,
            before_id: self.before_id,
        };
        Ok(PageRequest::new(cursor, self.page_size)?.with_query(self.query.clone()))
    }
}

impl ProjectScoped for ListJobsParams {
    fn project_id(&self) -> Option<ProjectId> {
        Some(ProjectId::new(self.project_id))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobPath {
    #[validate(range(min = 1))]
    pub project_id: i64,
    #[validate(range(min = 1))]
    pub job_id: i64,
}

impl ProjectScoped for JobPath {
    fn project_id(&self) -> Option<ProjectId> {
        Some(ProjectId::new(self.project_id))
    }
}

/// `userId` is the member's email address.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MemberPath {
    #[validate(range(min = 1))]
    pub project_id: i64,
    #[validate(email, length(max = 320))]
    pub user_id: String,
}

impl ProjectScoped for MemberPath {
    fn project_id(&self) -> Option<ProjectId> {
        Some(ProjectId::new(self.project_id))
    }
}

/// Annotator routes address a job directly, outside any project scope.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PublicJobPath {
    #[validate(range(min = 1))]
    pub job_id: i64,
}

// --- Bodies -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUnit {
    /// Caller-chosen identifier, unique within the job.
    #[validate(length(min = 1, max = 200))]
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Opaque codebook/layout document, stored as given.
    #[serde(default)]
    pub codebook: Value,
    #[validate(length(min = 1, max = 10000), nested)]
    pub units: Vec<NewUnit>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "update_changes_something"))]
pub struct UpdateJobRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub archived: Option<bool>,
}

fn update_changes_something(update: &UpdateJobRequest) -> Result<(), ValidationError> {
    if update.name.is_none() && update.archived.is_none() {
        return Err(ValidationError::new("empty_update")
            .with_message("nothing to update; give name or archived".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyAnnotatorRequest {
    /// Lets a returning annotator resume their earlier work.
    #[validate(length(min = 1, max = 200))]
    pub user_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnnotationRequest {
    #[validate(range(min = 1))]
    pub unit_id: i64,
    #[validate(custom(function = "present"))]
    pub annotation: Value,
}

fn present(value: &Value) -> Result<(), ValidationError> {
    if value.is_null() {
        return Err(ValidationError::new("required").with_message("annotation is required".into()));
    }
    Ok(())
}

// --- Responses ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    #[validate(range(min = 1))]
    pub id: i64,
    #[validate(length(min = 1))]
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(range(min = 1))]
    pub project_id: i64,
    pub role: Role,
    pub actions: Vec<ProjectAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    #[validate(range(min = 1))]
    pub id: i64,
    #[validate(length(min = 1))]
    pub name: String,
    pub unit_count: usize,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Member {
    #[validate(length(min = 3))]
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MemberList {
    #[validate(nested)]
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    #[validate(range(min = 1))]
    pub id: i64,
    pub external_id: String,
    pub data: Value,
    /// This annotator's current annotation, if any.
    pub annotation: Option<Value>,
}

/// Everything an annotator needs to work on their job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatorView {
    #[validate(range(min = 1))]
    pub annotator_id: i64,
    #[validate(range(min = 1))]
    pub job_id: i64,
    pub job_name: String,
    pub codebook: Value,
    pub annotated_count: usize,
    #[validate(nested)]
    pub units: Vec<UnitView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationReceipt {
    #[validate(range(min = 1))]
    pub annotator_id: i64,
    #[validate(range(min = 1))]
    pub unit_id: i64,
    /// `false` when an earlier annotation of the same unit was replaced.
    pub created: bool,
}

/// Payload sealed into the annotator session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatorSession {
    #[validate(range(min = 1))]
    pub annotator_id: i64,
    #[validate(range(min = 1))]
    pub job_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_list_params_reject_two_boundaries() {
        let params: ListJobsParams =
            serde_json::from_value(json!({"projectId": 1, "afterId": 3, "beforeId": 9})).unwrap();
        assert!(params.validate().is_err());

        let params: ListJobsParams =
            serde_json::from_value(json!({"projectId": 1, "afterId": 3, "pageSize": 5})).unwrap();
        assert!(params.validate().is_ok());
        let request = params.page_request().unwrap();
        assert_eq!(request.page_size(), 5);
        assert_eq!(request.cursor(), PaginationCursor::after(3));
    }

    #[test]
    fn job_creation_checks_every_unit() {
        let body: CreateJobRequest = serde_json::from_value(json!({
            "name": "Sentiment",
            "units": [{"id": "u1", "data": {"text": "hi"}}, {"id": ""}],
        }))
        .unwrap();
        assert!(body.validate().is_err());

        let body: CreateJobRequest =
            serde_json::from_value(json!({"name": "Sentiment", "units": []})).unwrap();
        assert!(body.validate().is_err());
    }

    #[test]
    fn member_path_needs_an_email_address() {
        let path: MemberPath =
            serde_json::from_value(json!({"projectId": 1, "userId": "bob@example.org"})).unwrap();
        assert!(path.validate().is_ok());

        let path: MemberPath =
            serde_json::from_value(json!({"projectId": 1, "userId": "not-an-email"})).unwrap();
        assert!(path.validate().is_err());
    }

    #[test]
    fn empty_job_update_is_invalid() {
        let body: UpdateJobRequest = serde_json::from_value(json!({})).unwrap();
        assert!(body.validate().is_err());

        let body: UpdateJobRequest = serde_json::from_value(json!({"archived": true})).unwrap();
        assert!(body.validate().is_ok());
    }

    #[test]
    fn annotation_must_be_present() {
        let body: SubmitAnnotationRequest =
            serde_json::from_value(json!({"unitId": 4, "annotation": null})).unwrap();
        assert!(body.validate().is_err());
    }
}
