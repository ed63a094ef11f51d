//! Caller identification.
//!
//! Every route asks an [`Authenticator`] who is calling. The answer is an
//! email address, taken from a signed identity token or, in development,
//! from configuration.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use annotate_auth::{TokenError, TokenVerifier};
use annotate_core::Email;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthnError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("token rejected: {0}")]
    Rejected(#[from] TokenError),

    #[error("identity provider unavailable: {0}")]
    Provider(String),
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Email, AuthnError>;
}

/// Verifies `Authorization: Bearer <token>` headers.
#[derive(Debug, Clone)]
pub struct BearerAuthenticator {
    verifier: TokenVerifier,
}

impl BearerAuthenticator {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Email, AuthnError> {
        let token = extract_bearer(headers)?;
        let claims = self.verifier.verify(token, Utc::now())?;
        let email = claims.email().map_err(TokenError::from)?;
        Ok(email)
    }
}

/// Development mode: every request is the configured identity.
#[derive(Debug, Clone)]
pub struct DisabledAuthenticator {
    identity: Email,
}

impl DisabledAuthenticator {
    pub fn new(identity: Email) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl Authenticator for DisabledAuthenticator {
    async fn authenticate(&self, _headers: &HeaderMap) -> Result<Email, AuthnError> {
        Ok(self.identity.clone())
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthnError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthnError::MissingToken)?;

    let header = header.to_str().map_err(|_| AuthnError::MalformedHeader)?;

    // The scheme name is case-insensitive.
    let (scheme, token) = header.split_once(' ').ok_or(AuthnError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthnError::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthnError::MissingToken);
    }

    Ok(token)
}

#[derive(Debug, Deserialize)]
struct ProviderConfiguration {
    public_key: String,
}

/// Fetch the provider's signing key from `{base_url}/api/configuration`.
pub async fn discover_verifier(base_url: &str) -> Result<TokenVerifier, AuthnError> {
    let url = format!("{}/api/configuration", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| AuthnError::Provider(e.to_string()))?;

    let config: ProviderConfiguration = client
        .get(&url)
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .map_err(|e| AuthnError::Provider(e.to_string()))?
        .json()
        .await
        .map_err(|e| AuthnError::Provider(e.to_string()))?;

    tracing::info!(%url, "loaded identity provider signing key");
    Ok(TokenVerifier::rs256_pem(config.public_key.as_bytes())?)
}
