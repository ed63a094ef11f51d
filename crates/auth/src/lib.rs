//! `annotate-auth`: authentication/authorization boundary.
//!
//! This crate is decoupled from HTTP routing and storage: it knows how to seal
//! and open session cookies, verify identity tokens and compare roles, and
//! nothing about where requests come from.

pub mod authorize;
pub mod claims;
pub mod principal;
pub mod roles;
pub mod session;

pub use authorize::{AuthzError, ProjectAction, allowed_actions, authorize};
pub use claims::{IdentityClaims, TokenError, TokenValidationError, TokenVerifier, validate_claims};
pub use principal::AuthContext;
pub use roles::{Role, UnknownRole, has_min_role, role_satisfies};
pub use session::{Session, SessionCodec, SessionError};

pub use cookie::Cookie;
