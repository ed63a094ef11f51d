//! Annotator endpoints.
//!
//! Annotators never hold identity tokens. Joining a job seals an
//! [`AnnotatorSession`] into a cookie; later requests are identified by
//! that cookie alone.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde_json::Value;

use annotate_core::{AnnotatorId, JobId, UnitId};

use crate::app::AppState;
use crate::app::dto::{AnnotatorSession, IdentifyAnnotatorRequest, PublicJobPath, SubmitAnnotationRequest};
use crate::app::errors::ApiError;
use crate::params::parse_params;
use crate::route::{parse_body, respond};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/:jobId/annotator", post(identify))
        .route("/annotator/session", get(session))
        .route("/annotator/annotations", post(submit_annotation))
}

/// Join a job as an annotator. A known `userKey` resumes the earlier
/// annotator instead of registering a new one.
pub async fn identify(
    State(state): State<AppState>,
    Path(path): Path<HashMap<String, String>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let params: PublicJobPath = parse_params(&path)?;
    let request: IdentifyAnnotatorRequest = if body.iter().all(u8::is_ascii_whitespace) {
        IdentifyAnnotatorRequest::default()
    } else {
        parse_body(&body)?
    };

    let registration = state
        .store
        .register_annotator(JobId::new(params.job_id), request.user_key)?;
    let payload = AnnotatorSession {
        annotator_id: registration.annotator_id.get(),
        job_id: registration.job_id.get(),
    };
    let cookie = state
        .annotator_session
        .seal(&state.sessions, &payload, Utc::now())
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(
        annotator_id = payload.annotator_id,
        job_id = payload.job_id,
        returning = registration.returning,
        "annotator joined job"
    );

    let view = respond(&state.store.annotator_view(registration.annotator_id)?)?;
    Ok((jar.add(cookie), Json(view)))
}

fn current_session(state: &AppState, jar: &CookieJar) -> Result<AnnotatorSession, ApiError> {
    state
        .annotator_session
        .read(&state.sessions, jar.get(state.annotator_session.name()), Utc::now())
        .ok_or(ApiError::Unauthenticated)
}

pub async fn session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<Value>, ApiError> {
    let session = current_session(&state, &jar)?;
    let view = state
        .store
        .annotator_view(AnnotatorId::new(session.annotator_id))?;
    Ok(Json(respond(&view)?))
}

/// Store (or replace) the session annotator's annotation of one unit.
pub async fn submit_annotation(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let session = current_session(&state, &jar)?;
    let request: SubmitAnnotationRequest = parse_body(&body)?;

    let receipt = state
        .store
        .submit_annotation(
            AnnotatorId::new(session.annotator_id),
            UnitId::new(request.unit_id),
            request.annotation,
        )?;
    Ok(Json(respond(&receipt)?))
}
