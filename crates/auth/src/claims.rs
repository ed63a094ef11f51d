use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use annotate_core::Email;

/// Claims carried by identity tokens from the external identity provider.
///
/// Only the fields this service reads are modeled; providers may add more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Caller's email address; the identity used for every role lookup.
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Issued-at, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration, seconds since the epoch.
    pub exp: i64,
}

impl IdentityClaims {
    pub fn email(&self) -> Result<Email, TokenValidationError> {
        Email::parse(&self.email).map_err(|_| TokenValidationError::MissingEmail)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("token carries no usable email claim")]
    MissingEmail,
}

/// Deterministically validate identity claims against `now`.
///
/// Signature checks happen in [`TokenVerifier`]; this only looks at the
/// claim values.
pub fn validate_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if let Some(iat) = claims.iat {
        if claims.exp <= iat {
            return Err(TokenValidationError::InvalidTimeWindow);
        }
        if now < iat {
            return Err(TokenValidationError::NotYetValid);
        }
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    claims.email()?;
    Ok(())
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token could not be verified: {0}")]
    Decode(String),

    #[error("invalid verification key: {0}")]
    Key(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies identity token signatures and claims.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Shared-secret verifier, for development and tests.
    pub fn hs256(secret: &[u8]) -> Self {
        Self::new(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// Verifier for a provider that signs with an RSA key published as PEM.
    pub fn rs256_pem(pem: &[u8]) -> Result<Self, TokenError> {
        let key = DecodingKey::from_rsa_pem(pem).map_err(|e| TokenError::Key(e.to_string()))?;
        Ok(Self::new(key, Algorithm::RS256))
    }

    fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        Self { key, validation }
    }

    /// Only accept tokens minted for `audience`.
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityClaims, TokenError> {
        let data = jsonwebtoken::decode::<IdentityClaims>(token, &self.key, &self.validation)
            .map_err(|e| TokenError::Decode(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

impl core::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("validate_aud", &self.validation.validate_aud)
            .finish()
    }
}
