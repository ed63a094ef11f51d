//! HTTP application wiring (Axum router + shared state).
//!
//! - `services.rs`: the in-memory data layer and role directory
//! - `routes/`: route specs and handlers, one file per area
//! - `dto.rs`: request/response shapes and their schemas
//! - `errors.rs`: error types and their JSON responses

use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use axum::{Router, routing::get};

use annotate_auth::{Session, SessionCodec, TokenVerifier};

use crate::config::{ApiConfig, IdentitySource};
use crate::identity::{Authenticator, BearerAuthenticator, DisabledAuthenticator, discover_verifier};
use crate::route::Dispatcher;

use self::dto::AnnotatorSession;
use self::services::InMemoryStore;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub const ANNOTATOR_SESSION_COOKIE: &str = "annotator_session";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<InMemoryStore>,
    pub sessions: SessionCodec,
    pub annotator_session: Session<AnnotatorSession>,
}

impl FromRef<AppState> for Arc<Dispatcher> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.dispatcher)
    }
}

impl AppState {
    pub fn new(
        config: &ApiConfig,
        authenticator: Arc<dyn Authenticator>,
        store: Arc<InMemoryStore>,
    ) -> anyhow::Result<Self> {
        let sessions = match config.session_secret.as_deref() {
            Some(secret) => {
                SessionCodec::from_secret(secret.as_bytes()).context("SESSION_SECRET is unusable")?
            }
            None => {
                tracing::warn!("SESSION_SECRET not set; annotator sessions will not survive a restart");
                SessionCodec::generate()
            }
        }
        .with_secure(config.secure_cookies);

        let dispatcher = Dispatcher::new(authenticator, store.clone())
            .with_auth_disabled(config.auth_disabled());

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            store,
            sessions,
            annotator_session: Session::new(ANNOTATOR_SESSION_COOKIE, config.annotator_session_ttl),
        })
    }
}

pub async fn build_authenticator(config: &ApiConfig) -> anyhow::Result<Arc<dyn Authenticator>> {
    let authenticator: Arc<dyn Authenticator> = match &config.identity {
        IdentitySource::Disabled { identity } => {
            tracing::warn!(%identity, "authentication disabled; every caller is an admin");
            Arc::new(DisabledAuthenticator::new(identity.clone()))
        }
        IdentitySource::SharedSecret(secret) => {
            let verifier = with_audience(TokenVerifier::hs256(secret.as_bytes()), config);
            Arc::new(BearerAuthenticator::new(verifier))
        }
        IdentitySource::Provider { base_url } => {
            let verifier = discover_verifier(base_url)
                .await
                .with_context(|| format!("failed to load signing key from {base_url}"))?;
            Arc::new(BearerAuthenticator::new(with_audience(verifier, config)))
        }
    };
    Ok(authenticator)
}

fn with_audience(verifier: TokenVerifier, config: &ApiConfig) -> TokenVerifier {
    match config.token_audience.as_deref() {
        Some(audience) => verifier.with_audience(audience),
        None => verifier,
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: ApiConfig) -> anyhow::Result<Router> {
    let authenticator = build_authenticator(&config).await?;
    let state = AppState::new(&config, authenticator, Arc::new(InMemoryStore::new()))?;
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router(state.store.clone()))
        .with_state(state)
}
