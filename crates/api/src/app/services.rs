//! In-process data layer.
//!
//! Projects, memberships, jobs, annotators and annotations live behind a
//! single mutex. Every method is synchronous and holds the lock only for
//! its own duration.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::instrument;

use annotate_auth::Role;
use annotate_core::{
    AnnotatorId, DomainError, DomainResult, Email, JobId, Page, PageRequest, ProjectId, UnitId,
    paginate_by_id,
};

use crate::app::dto::{
    AnnotationReceipt, AnnotatorView, CreateJobRequest, JobSummary, Member, MemberList,
    ProjectSummary, UnitView, UpdateJobRequest,
};
use crate::app::errors::OperationError;
use crate::authz::RoleDirectory;

#[derive(Debug, Clone)]
struct ProjectRecord {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct UnitRecord {
    id: UnitId,
    external_id: String,
    data: Value,
}

#[derive(Debug, Clone)]
struct JobRecord {
    id: JobId,
    project_id: ProjectId,
    name: String,
    codebook: Value,
    units: Vec<UnitRecord>,
    archived: bool,
    created_at: DateTime<Utc>,
}

impl JobRecord {
    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.get(),
            name: self.name.clone(),
            unit_count: self.units.len(),
            archived: self.archived,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
struct AnnotatorRecord {
    job_id: JobId,
    user_key: Option<String>,
}

#[derive(Debug, Clone)]
struct AnnotationRecord {
    value: Value,
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: i64,
    projects: BTreeMap<ProjectId, ProjectRecord>,
    members: BTreeMap<(ProjectId, Email), Role>,
    jobs: BTreeMap<JobId, JobRecord>,
    annotators: BTreeMap<AnnotatorId, AnnotatorRecord>,
    annotations: BTreeMap<(AnnotatorId, UnitId), AnnotationRecord>,
}

impl StoreState {
    /// Ids are shared across every table and start at 1.
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn project(&self, id: ProjectId) -> DomainResult<&ProjectRecord> {
        self.projects.get(&id).ok_or(DomainError::not_found("project"))
    }

    fn job_in_project(&mut self, project_id: ProjectId, job_id: JobId) -> DomainResult<&mut JobRecord> {
        self.jobs
            .get_mut(&job_id)
            .filter(|job| job.project_id == project_id)
            .ok_or(DomainError::not_found("job"))
    }

    fn annotator(&self, id: AnnotatorId) -> DomainResult<(&AnnotatorRecord, &JobRecord)> {
        let annotator = self.annotators.get(&id).ok_or(DomainError::not_found("annotator"))?;
        let job = self.jobs.get(&annotator.job_id).ok_or(DomainError::not_found("job"))?;
        Ok((annotator, job))
    }
}

/// A freshly registered or returning annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub annotator_id: AnnotatorId,
    pub job_id: JobId,
    pub returning: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> DomainResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| DomainError::storage("store lock poisoned"))
    }

    pub fn role_of(&self, email: &Email, project_id: ProjectId) -> DomainResult<Option<Role>> {
        let state = self.state()?;
        Ok(state.members.get(&(project_id, email.clone())).copied())
    }

    /// Create a project; its creator becomes its first admin.
    #[instrument(skip_all, fields(creator = %creator), err)]
    pub fn create_project(&self, creator: &Email, name: &str) -> DomainResult<ProjectSummary> {
        let mut state = self.state()?;
        let id = ProjectId::new(state.next_id());
        let record = ProjectRecord {
            name: name.trim().to_string(),
            created_at: Utc::now(),
        };
        let summary = ProjectSummary {
            id: id.get(),
            name: record.name.clone(),
            role: Role::Admin,
            created_at: record.created_at,
        };
        state.projects.insert(id, record);
        state.members.insert((id, creator.clone()), Role::Admin);
        Ok(summary)
    }

    pub fn list_jobs(&self, project_id: ProjectId, request: &PageRequest) -> DomainResult<Page<JobSummary>> {
        let state = self.state()?;
        state.project(project_id)?;

        let needle = request.query().map(str::to_lowercase);
        let jobs: Vec<JobSummary> = state
            .jobs
            .values()
            .filter(|job| job.project_id == project_id)
            .filter(|job| {
                needle
                    .as_deref()
                    .is_none_or(|needle| job.name.to_lowercase().contains(needle))
            })
            .map(JobRecord::summary)
            .collect();

        Ok(paginate_by_id(&jobs, |job| job.id, request))
    }

    #[instrument(skip_all, fields(project_id = %project_id, units = request.units.len()), err)]
    pub fn create_job(&self, project_id: ProjectId, request: CreateJobRequest) -> DomainResult<JobSummary> {
        let mut state = self.state()?;
        state.project(project_id)?;

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = request.units.iter().find(|unit| !seen.insert(unit.id.as_str())) {
            return Err(DomainError::validation(format!("duplicate unit id '{}'", dup.id)));
        }

        let id = JobId::new(state.next_id());
        let mut units = Vec::with_capacity(request.units.len());
        for unit in request.units {
            units.push(UnitRecord {
                id: UnitId::new(state.next_id()),
                external_id: unit.id,
                data: unit.data,
            });
        }

        let record = JobRecord {
            id,
            project_id,
            name: request.name.trim().to_string(),
            codebook: request.codebook,
            units,
            archived: false,
            created_at: Utc::now(),
        };
        let summary = record.summary();
        state.jobs.insert(id, record);
        Ok(summary)
    }

    #[instrument(skip_all, fields(project_id = %project_id, job_id = %job_id), err)]
    pub fn update_job(
        &self,
        project_id: ProjectId,
        job_id: JobId,
        update: UpdateJobRequest,
    ) -> DomainResult<JobSummary> {
        let mut state = self.state()?;
        let job = state.job_in_project(project_id, job_id)?;
        if let Some(name) = update.name {
            job.name = name.trim().to_string();
        }
        if let Some(archived) = update.archived {
            job.archived = archived;
        }
        Ok(job.summary())
    }

    pub fn list_members(&self, project_id: ProjectId) -> DomainResult<MemberList> {
        let state = self.state()?;
        state.project(project_id)?;

        let members = state
            .members
            .iter()
            .filter(|((project, _), _)| *project == project_id)
            .map(|((_, email), role)| Member {
                email: email.to_string(),
                role: *role,
            })
            .collect();
        Ok(MemberList { members })
    }

    /// Add a member or change their role. A project always keeps one admin.
    #[instrument(skip_all, fields(project_id = %project_id, member = %email, role = %role), err)]
    pub fn set_member_role(&self, project_id: ProjectId, email: Email, role: Role) -> DomainResult<Member> {
        let mut state = self.state()?;
        state.project(project_id)?;

        let key = (project_id, email);
        let demotes_admin = state.members.get(&key) == Some(&Role::Admin) && role != Role::Admin;
        if demotes_admin {
            let admins = state
                .members
                .iter()
                .filter(|((project, _), r)| *project == project_id && **r == Role::Admin)
                .count();
            if admins <= 1 {
                return Err(DomainError::conflict("a project must keep at least one admin"));
            }
        }

        let member = Member {
            email: key.1.to_string(),
            role,
        };
        state.members.insert(key, role);
        Ok(member)
    }

    /// Register an annotator for a job, or find the one behind `user_key`.
    #[instrument(skip_all, fields(job_id = %job_id), err)]
    pub fn register_annotator(&self, job_id: JobId, user_key: Option<String>) -> DomainResult<Registration> {
        let mut state = self.state()?;
        let job = state.jobs.get(&job_id).ok_or(DomainError::not_found("job"))?;
        if job.archived {
            return Err(DomainError::conflict("job is archived"));
        }

        if let Some(key) = user_key.as_deref() {
            let existing = state
                .annotators
                .iter()
                .find(|(_, a)| a.job_id == job_id && a.user_key.as_deref() == Some(key))
                .map(|(id, _)| *id);
            if let Some(annotator_id) = existing {
                return Ok(Registration {
                    annotator_id,
                    job_id,
                    returning: true,
                });
            }
        }

        let annotator_id = AnnotatorId::new(state.next_id());
        state
            .annotators
            .insert(annotator_id, AnnotatorRecord { job_id, user_key });
        Ok(Registration {
            annotator_id,
            job_id,
            returning: false,
        })
    }

    pub fn annotator_view(&self, annotator_id: AnnotatorId) -> DomainResult<AnnotatorView> {
        let state = self.state()?;
        let (_, job) = state.annotator(annotator_id)?;

        let units: Vec<UnitView> = job
            .units
            .iter()
            .map(|unit| UnitView {
                id: unit.id.get(),
                external_id: unit.external_id.clone(),
                data: unit.data.clone(),
                annotation: state
                    .annotations
                    .get(&(annotator_id, unit.id))
                    .map(|a| a.value.clone()),
            })
            .collect();

        Ok(AnnotatorView {
            annotator_id: annotator_id.get(),
            job_id: job.id.get(),
            job_name: job.name.clone(),
            codebook: job.codebook.clone(),
            annotated_count: units.iter().filter(|u| u.annotation.is_some()).count(),
            units,
        })
    }

    /// Store an annotation, replacing any earlier one for the same unit.
    #[instrument(skip_all, fields(annotator_id = %annotator_id, unit_id = %unit_id), err)]
    pub fn submit_annotation(
        &self,
        annotator_id: AnnotatorId,
        unit_id: UnitId,
        value: Value,
    ) -> DomainResult<AnnotationReceipt> {
        let mut state = self.state()?;
        let (_, job) = state.annotator(annotator_id)?;
        if job.archived {
            return Err(DomainError::conflict("job is archived"));
        }
        if !job.units.iter().any(|unit| unit.id == unit_id) {
            return Err(DomainError::not_found("unit"));
        }

        let previous = state.annotations.insert(
            (annotator_id, unit_id),
            AnnotationRecord { value },
        );
        Ok(AnnotationReceipt {
            annotator_id: annotator_id.get(),
            unit_id: unit_id.get(),
            created: previous.is_none(),
        })
    }
}

#[async_trait]
impl RoleDirectory for InMemoryStore {
    async fn project_role(
        &self,
        email: &Email,
        project_id: ProjectId,
    ) -> Result<Option<Role>, OperationError> {
        Ok(self.role_of(email, project_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::dto::NewUnit;
    use annotate_core::PaginationCursor;
    use serde_json::json;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    fn job_request(name: &str, units: &[&str]) -> CreateJobRequest {
        CreateJobRequest {
            name: name.to_string(),
            codebook: Value::Null,
            units: units
                .iter()
                .map(|id| NewUnit {
                    id: id.to_string(),
                    data: json!({"text": id}),
                })
                .collect(),
        }
    }

    #[test]
    fn project_creator_becomes_admin() {
        let store = InMemoryStore::new();
        let project = store.create_project(&email("ann@example.org"), " Tweets ").unwrap();

        assert_eq!(project.name, "Tweets");
        let id = ProjectId::new(project.id);
        assert_eq!(store.role_of(&email("ann@example.org"), id), Ok(Some(Role::Admin)));
        assert_eq!(store.role_of(&email("bob@example.org"), id), Ok(None));
    }

    #[test]
    fn jobs_page_forward_and_filter() {
        let store = InMemoryStore::new();
        let project = ProjectId::new(store.create_project(&email("ann@example.org"), "p").unwrap().id);
        for i in 0..5 {
            store.create_job(project, job_request(&format!("job {i}"), &["a"])).unwrap();
        }
        store.create_job(project, job_request("Special", &["a"])).unwrap();

        let first = store
            .list_jobs(project, &PageRequest::new(PaginationCursor::start(), Some(4)).unwrap())
            .unwrap();
        assert_eq!(first.items.len(), 4);
        assert!(first.has_next_page);
        assert!(!first.has_prev_page);

        let after = first.items.last().unwrap().id;
        let second = store
            .list_jobs(project, &PageRequest::new(PaginationCursor::after(after), Some(4)).unwrap())
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(!second.has_next_page);
        assert!(second.has_prev_page);

        let filtered = store
            .list_jobs(
                project,
                &PageRequest::new(PaginationCursor::start(), None)
                    .unwrap()
                    .with_query(Some("special".to_string())),
            )
            .unwrap();
        assert_eq!(filtered.items.len(), 1);
        assert_eq!(filtered.items[0].name, "Special");
    }

    #[test]
    fn duplicate_unit_ids_are_rejected() {
        let store = InMemoryStore::new();
        let project = ProjectId::new(store.create_project(&email("ann@example.org"), "p").unwrap().id);

        let err = store.create_job(project, job_request("j", &["a", "b", "a"])).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn last_admin_cannot_be_demoted() {
        let store = InMemoryStore::new();
        let ann = email("ann@example.org");
        let project = ProjectId::new(store.create_project(&ann, "p").unwrap().id);

        let err = store.set_member_role(project, ann.clone(), Role::Manager).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        store.set_member_role(project, email("bob@example.org"), Role::Admin).unwrap();
        store.set_member_role(project, ann.clone(), Role::Manager).unwrap();
        assert_eq!(store.role_of(&ann, project), Ok(Some(Role::Manager)));
    }

    #[test]
    fn returning_annotators_are_recognized_by_user_key() {
        let store = InMemoryStore::new();
        let project = ProjectId::new(store.create_project(&email("ann@example.org"), "p").unwrap().id);
        let job = JobId::new(store.create_job(project, job_request("j", &["a"])).unwrap().id);

        let first = store.register_annotator(job, Some("coder-1".to_string())).unwrap();
        let again = store.register_annotator(job, Some("coder-1".to_string())).unwrap();
        let anonymous = store.register_annotator(job, None).unwrap();

        assert!(!first.returning);
        assert!(again.returning);
        assert_eq!(first.annotator_id, again.annotator_id);
        assert_ne!(first.annotator_id, anonymous.annotator_id);
    }

    #[test]
    fn annotations_are_upserted_per_unit() {
        let store = InMemoryStore::new();
        let project = ProjectId::new(store.create_project(&email("ann@example.org"), "p").unwrap().id);
        let job = JobId::new(store.create_job(project, job_request("j", &["a", "b"])).unwrap().id);
        let annotator = store.register_annotator(job, None).unwrap().annotator_id;

        // Units get ids right after their job.
        let unit = UnitId::new(job.get() + 1);
        let first = store.submit_annotation(annotator, unit, json!({"label": 1})).unwrap();
        let second = store.submit_annotation(annotator, unit, json!({"label": 2})).unwrap();
        assert!(first.created);
        assert!(!second.created);
        let view = store.annotator_view(annotator).unwrap();
        assert_eq!(view.annotated_count, 1);
        assert_eq!(view.units[0].annotation, Some(json!({"label": 2})));
        assert_eq!(view.units[1].annotation, None);

        let err = store
            .submit_annotation(annotator, UnitId::new(9_999), json!({}))
            .unwrap_err();
        assert_eq!(err, DomainError::not_found("unit"));
    }

    #[test]
    fn archived_jobs_take_no_new_work() {
        let store = InMemoryStore::new();
        let project = ProjectId::new(store.create_project(&email("ann@example.org"), "p").unwrap().id);
        let job = JobId::new(store.create_job(project, job_request("j", &["a"])).unwrap().id);
        let annotator = store.register_annotator(job, None).unwrap().annotator_id;

        store
            .update_job(project, job, UpdateJobRequest { name: None, archived: Some(true) })
            .unwrap();

        assert!(matches!(store.register_annotator(job, None), Err(DomainError::Conflict(_))));
        assert!(matches!(
            store.submit_annotation(annotator, UnitId::new(job.get() + 1), json!({})),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn jobs_are_only_reachable_through_their_project() {
        let store = InMemoryStore::new();
        let ann = email("ann@example.org");
        let p1 = ProjectId::new(store.create_project(&ann, "p1").unwrap().id);
        let p2 = ProjectId::new(store.create_project(&ann, "p2").unwrap().id);
        let job = JobId::new(store.create_job(p1, job_request("j", &["a"])).unwrap().id);

        let err = store
            .update_job(p2, job, UpdateJobRequest { name: Some("x".to_string()), archived: None })
            .unwrap_err();
        assert_eq!(err, DomainError::not_found("job"));
    }
}
