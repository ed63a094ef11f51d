use std::sync::Arc;

use axum::Router;

use annotate_auth::ProjectAction;
use annotate_core::{Email, JobId, Page, ProjectId};

use crate::app::AppState;
use crate::app::dto::{CreateJobRequest, JobPath, JobSummary, ListJobsParams, ProjectPath, UpdateJobRequest};
use crate::app::errors::OperationError;
use crate::app::services::InMemoryStore;
use crate::authz::require;
use crate::context::RouteInput;
use crate::route::{self, NoBody, RouteSpec};

pub fn router(store: Arc<InMemoryStore>) -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:projectId/jobs",
            route::get(list_jobs(store.clone())).merge(route::post(create_job(store.clone()))),
        )
        .route("/projects/:projectId/jobs/:jobId", route::patch(update_job(store)))
}

/// Cursor-paginated job list; `query` filters on name.
pub fn list_jobs(store: Arc<InMemoryStore>) -> RouteSpec<ListJobsParams, NoBody, Page<JobSummary>> {
    RouteSpec::new(
        "list_jobs",
        move |_email: Option<Email>, input: RouteInput<ListJobsParams, NoBody>| {
            let store = store.clone();
            async move {
                let request = input.params.page_request()?;
                store
                    .list_jobs(ProjectId::new(input.params.project_id), &request)
                    .map_err(OperationError::from)
            }
        },
    )
    .authorize(require(ProjectAction::ViewJobs))
}

pub fn create_job(store: Arc<InMemoryStore>) -> RouteSpec<ProjectPath, CreateJobRequest, JobSummary> {
    RouteSpec::new(
        "create_job",
        move |_email: Option<Email>, input: RouteInput<ProjectPath, CreateJobRequest>| {
            let store = store.clone();
            async move {
                store
                    .create_job(ProjectId::new(input.params.project_id), input.body)
                    .map_err(OperationError::from)
            }
        },
    )
    .authorize(require(ProjectAction::ManageJobs))
}

/// Rename or (un)archive a job.
pub fn update_job(store: Arc<InMemoryStore>) -> RouteSpec<JobPath, UpdateJobRequest, JobSummary> {
    RouteSpec::new(
        "update_job",
        move |_email: Option<Email>, input: RouteInput<JobPath, UpdateJobRequest>| {
            let store = store.clone();
            async move {
                store
                    .update_job(
                        ProjectId::new(input.params.project_id),
                        JobId::new(input.params.job_id),
                        input.body,
                    )
                    .map_err(OperationError::from)
            }
        },
    )
    .authorize(require(ProjectAction::ManageJobs))
}
