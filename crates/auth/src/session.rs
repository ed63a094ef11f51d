//! Stateless, encrypted cookie sessions.
//!
//! A session is a small typed payload sealed with AES-256-GCM under a
//! server-held key (the `cookie` crate's private jar) together with its
//! creation time. Nothing is stored server-side: a session ends when its TTL
//! runs out, and there is no revocation before that. Keep TTLs short.
//!
//! The cookie name is authenticated along with the payload, so a value copied
//! into a different cookie does not open.

use std::borrow::Cow;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use cookie::{Cookie, CookieJar, Key, SameSite};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use validator::Validate;

/// Browsers drop cookies larger than this (name + value).
pub const MAX_COOKIE_BYTES: usize = 4096;

const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Decryption, decoding or payload validation failed.
    #[error("invalid session")]
    Invalid,

    #[error("session expired")]
    Expired,

    #[error("session cookie would be {0} bytes (limit 4096)")]
    TooLarge(usize),

    #[error("failed to serialize session payload: {0}")]
    Serialize(String),

    #[error("session secret must be at least 32 bytes")]
    WeakSecret,
}

/// Holds the symmetric key used to seal session cookies.
///
/// Build one at startup and hand it to whatever reads or writes sessions.
#[derive(Clone)]
pub struct SessionCodec {
    key: Key,
    secure: bool,
}

impl SessionCodec {
    /// Derive the cookie key from a secret of at least 32 bytes.
    pub fn from_secret(secret: &[u8]) -> Result<Self, SessionError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(SessionError::WeakSecret);
        }
        Ok(Self {
            key: Key::derive_from(secret),
            secure: true,
        })
    }

    /// Random key; sessions will not survive a restart.
    pub fn generate() -> Self {
        Self {
            key: Key::generate(),
            secure: true,
        }
    }

    /// Whether sealed cookies carry the `Secure` attribute (default: yes).
    pub fn with_secure(self, secure: bool) -> Self {
        Self { secure, ..self }
    }

    fn seal_value(&self, name: &str, plaintext: String) -> Option<String> {
        let mut jar = CookieJar::new();
        jar.private_mut(&self.key)
            .add(Cookie::new(name.to_string(), plaintext));
        jar.get(name).map(|sealed| sealed.value().to_string())
    }

    fn open_value(&self, name: &str, value: &str) -> Option<String> {
        let jar = CookieJar::new();
        jar.private(&self.key)
            .decrypt(Cookie::new(name.to_string(), value.to_string()))
            .map(|opened| opened.value().to_string())
    }
}

impl core::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("key", &"<redacted>")
            .field("secure", &self.secure)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SealedRef<'a, T> {
    created_at: i64,
    payload: &'a T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sealed<T> {
    created_at: i64,
    payload: T,
}

/// A typed session: cookie name, lifetime and payload schema.
pub struct Session<T> {
    name: Cow<'static, str>,
    ttl_seconds: i64,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            ttl_seconds: self.ttl_seconds,
            _payload: PhantomData,
        }
    }
}

impl<T> core::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl<T> Session<T> {
    pub const fn new(name: &'static str, ttl_seconds: i64) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ttl_seconds,
            _payload: PhantomData,
        }
    }

    pub fn with_ttl(self, ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

impl<T> Session<T>
where
    T: Serialize + DeserializeOwned + Validate,
{
    /// Seal `payload` into an opaque cookie value.
    pub fn encode(
        &self,
        codec: &SessionCodec,
        payload: &T,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let plaintext = serde_json::to_string(&SealedRef {
            created_at: now.timestamp(),
            payload,
        })
        .map_err(|e| SessionError::Serialize(e.to_string()))?;

        let value = codec
            .seal_value(&self.name, plaintext)
            .ok_or_else(|| SessionError::Serialize("sealed cookie missing from jar".to_string()))?;

        let size = self.name.len() + 1 + value.len();
        if size > MAX_COOKIE_BYTES {
            return Err(SessionError::TooLarge(size));
        }
        Ok(value)
    }

    /// Seal `payload` into a complete outgoing cookie. Adding it to the
    /// response is up to the caller.
    pub fn seal(
        &self,
        codec: &SessionCodec,
        payload: &T,
        now: DateTime<Utc>,
    ) -> Result<Cookie<'static>, SessionError> {
        let value = self.encode(codec, payload, now)?;
        Ok(Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(codec.secure)
            .max_age(cookie::time::Duration::seconds(self.ttl_seconds))
            .build())
    }

    /// Open a cookie value sealed by [`Self::encode`].
    pub fn decode(
        &self,
        codec: &SessionCodec,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<T, SessionError> {
        let plaintext = codec
            .open_value(&self.name, value)
            .ok_or(SessionError::Invalid)?;
        let sealed: Sealed<T> =
            serde_json::from_str(&plaintext).map_err(|_| SessionError::Invalid)?;

        let age = now.timestamp() - sealed.created_at;
        if age < 0 {
            return Err(SessionError::Invalid);
        }
        if age > self.ttl_seconds {
            return Err(SessionError::Expired);
        }

        sealed
            .payload
            .validate()
            .map_err(|_| SessionError::Invalid)?;
        Ok(sealed.payload)
    }

    pub fn open(
        &self,
        codec: &SessionCodec,
        cookie: &Cookie<'_>,
        now: DateTime<Utc>,
    ) -> Result<T, SessionError> {
        self.decode(codec, cookie.value(), now)
    }

    /// Lenient read for request handlers: any failure is simply "no session".
    pub fn read(
        &self,
        codec: &SessionCodec,
        cookie: Option<&Cookie<'_>>,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let cookie = cookie?;
        match self.open(codec, cookie, now) {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!(session = %self.name, error = %e, "ignoring unusable session cookie");
                None
            }
        }
    }
}
