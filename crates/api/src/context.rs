use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};

use annotate_auth::Role;

/// A request as the route dispatcher sees it, detached from the framework.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub method: Method,
    pub headers: HeaderMap,
    path: HashMap<String, String>,
    query: HashMap<String, String>,
    pub body: Bytes,
}

impl RouteRequest {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_path(mut self, path: HashMap<String, String>) -> Self {
        self.path = path;
        self
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Only POST, PUT and PATCH bodies are read; any other body is ignored.
    pub fn carries_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }

    /// Query and path params merged into one map. A path segment wins over
    /// a query key of the same name.
    pub fn raw_params(&self) -> HashMap<String, String> {
        let mut merged = self.query.clone();
        merged.extend(self.path.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Parsed, schema-checked inputs handed to authorization and the operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInput<P, B> {
    pub params: P,
    pub body: B,
    /// Caller's role in the addressed project, as resolved before
    /// authorization. `None` for non-members and unscoped routes.
    pub role: Option<Role>,
}
