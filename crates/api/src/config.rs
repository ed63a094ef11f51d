//! Runtime configuration, read from the environment once at startup.

use std::net::SocketAddr;

use thiserror::Error;

use annotate_core::Email;
use annotate_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_ANNOTATOR_SESSION_TTL: i64 = 24 * 60 * 60;
pub const DEFAULT_DEV_IDENTITY: &str = "dev@localhost";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not valid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("no identity source configured: set IDENTITY_PROVIDER_URL, JWT_SECRET or AUTH_DISABLED=true")]
    NoIdentitySource,
}

/// Where caller identities come from.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// Fetch the provider's public key at startup and verify RS256 tokens.
    Provider { base_url: String },
    /// Verify HS256 tokens with a shared secret.
    SharedSecret(String),
    /// No verification; every caller is `identity` with admin rights.
    Disabled { identity: Email },
}

impl core::fmt::Debug for IdentitySource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IdentitySource::Provider { base_url } => {
                f.debug_struct("Provider").field("base_url", base_url).finish()
            }
            IdentitySource::SharedSecret(_) => f.write_str("SharedSecret(<redacted>)"),
            IdentitySource::Disabled { identity } => {
                f.debug_struct("Disabled").field("identity", identity).finish()
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub identity: IdentitySource,
    /// Only accept identity tokens minted for this audience.
    pub token_audience: Option<String>,
    /// Secret for sealing session cookies; random per process when unset.
    pub session_secret: Option<String>,
    pub secure_cookies: bool,
    pub annotator_session_ttl: i64,
    pub log_format: LogFormat,
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("identity", &self.identity)
            .field("token_audience", &self.token_audience)
            .field("session_secret", &self.session_secret.as_ref().map(|_| "<redacted>"))
            .field("secure_cookies", &self.secure_cookies)
            .field("annotator_session_ttl", &self.annotator_session_ttl)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let auth_disabled = parse_bool("AUTH_DISABLED", var("AUTH_DISABLED"), false)?;
        let identity = if auth_disabled {
            let raw = var("DEV_IDENTITY").unwrap_or_else(|| DEFAULT_DEV_IDENTITY.to_string());
            let identity = Email::parse(&raw).map_err(|e| ConfigError::Invalid {
                name: "DEV_IDENTITY",
                reason: e.to_string(),
            })?;
            IdentitySource::Disabled { identity }
        } else if let Some(base_url) = var("IDENTITY_PROVIDER_URL") {
            IdentitySource::Provider { base_url }
        } else if let Some(secret) = var("JWT_SECRET") {
            IdentitySource::SharedSecret(secret)
        } else {
            return Err(ConfigError::NoIdentitySource);
        };

        let annotator_session_ttl = match var("ANNOTATOR_SESSION_TTL") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|ttl| *ttl > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "ANNOTATOR_SESSION_TTL",
                    reason: format!("expected a positive number of seconds, got '{raw}'"),
                })?,
            None => DEFAULT_ANNOTATOR_SESSION_TTL,
        };

        let log_format = match var("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| ConfigError::Invalid {
                name: "LOG_FORMAT",
                reason: e.to_string(),
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            identity,
            token_audience: var("TOKEN_AUDIENCE"),
            session_secret: var("SESSION_SECRET"),
            secure_cookies: parse_bool("SECURE_COOKIES", var("SECURE_COOKIES"), true)?,
            annotator_session_ttl,
            log_format,
        })
    }

    /// HS256 tokens, plain-HTTP cookies, ephemeral session key.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            identity: IdentitySource::SharedSecret(jwt_secret.to_string()),
            token_audience: None,
            session_secret: None,
            secure_cookies: false,
            annotator_session_ttl: DEFAULT_ANNOTATOR_SESSION_TTL,
            log_format: LogFormat::Pretty,
        }
    }

    pub fn auth_disabled(&self) -> bool {
        matches!(self.identity, IdentitySource::Disabled { .. })
    }
}

fn parse_bool(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_with_a_shared_secret() {
        let cfg = config(&[("JWT_SECRET", "s3cret")]).unwrap();

        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(cfg.identity, IdentitySource::SharedSecret("s3cret".to_string()));
        assert!(cfg.secure_cookies);
        assert_eq!(cfg.annotator_session_ttl, DEFAULT_ANNOTATOR_SESSION_TTL);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert!(!cfg.auth_disabled());
    }

    #[test]
    fn an_identity_source_is_required() {
        assert_eq!(config(&[]), Err(ConfigError::NoIdentitySource));
        assert_eq!(config(&[("JWT_SECRET", "  ")]), Err(ConfigError::NoIdentitySource));
    }

    #[test]
    fn disabling_auth_wins_over_other_sources() {
        let cfg = config(&[
            ("AUTH_DISABLED", "true"),
            ("JWT_SECRET", "s3cret"),
            ("DEV_IDENTITY", "Me@Example.org"),
        ])
        .unwrap();

        assert!(cfg.auth_disabled());
        assert_eq!(
            cfg.identity,
            IdentitySource::Disabled {
                identity: Email::parse("me@example.org").unwrap()
            }
        );
    }

    #[test]
    fn provider_url_beats_shared_secret() {
        let cfg = config(&[
            ("IDENTITY_PROVIDER_URL", "https://id.example.org"),
            ("JWT_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(
            cfg.identity,
            IdentitySource::Provider {
                base_url: "https://id.example.org".to_string()
            }
        );
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config(&[("JWT_SECRET", "x"), ("ANNOTATOR_SESSION_TTL", "-5")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ANNOTATOR_SESSION_TTL", .. }));

        let err = config(&[("JWT_SECRET", "x"), ("SECURE_COOKIES", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SECURE_COOKIES", .. }));

        let err = config(&[("JWT_SECRET", "x"), ("BIND_ADDR", "nowhere")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BIND_ADDR", .. }));
    }

    #[test]
    fn secrets_stay_out_of_debug_output() {
        let mut cfg = config(&[("JWT_SECRET", "hunter2-jwt")]).unwrap();
        cfg.session_secret = Some("hunter2-session".to_string());

        let debug = format!("{cfg:?}");
        assert!(!debug.contains("hunter2"));
    }
}
