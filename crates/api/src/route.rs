//! Declarative route handlers.
//!
//! A [`RouteSpec`] names a route's param, body and response types plus an
//! authorization rule and the operation itself. The [`Dispatcher`] runs
//! every request through the same fixed pipeline:
//!
//! 1. authenticate (401 when required and missing)
//! 2. coerce and validate params (400)
//! 3. parse and validate the JSON body of POST/PUT/PATCH requests (400)
//! 4. resolve the caller's project role and authorize (403)
//! 5. run the operation and validate its result against the response type
//!
//! A later step never runs when an earlier one failed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{FromRef, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use validator::{Validate, ValidationErrors};

use annotate_auth::{AuthContext, Role};
use annotate_core::{Email, ProjectId};

use crate::app::errors::{ApiError, OperationError, describe_validation_errors};
use crate::authz::RoleDirectory;
use crate::context::{RouteInput, RouteRequest};
use crate::identity::Authenticator;
use crate::params;

/// Params that may address a project. The dispatcher looks up the caller's
/// role in that project before authorizing.
pub trait ProjectScoped {
    fn project_id(&self) -> Option<ProjectId> {
        None
    }
}

pub trait ParamSchema: DeserializeOwned + Validate + ProjectScoped + Send + Sync + 'static {}
impl<T> ParamSchema for T where T: DeserializeOwned + Validate + ProjectScoped + Send + Sync + 'static {}

pub trait BodySchema: DeserializeOwned + Validate + Send + Sync + 'static {}
impl<T> BodySchema for T where T: DeserializeOwned + Validate + Send + Sync + 'static {}

pub trait ResponseSchema: Serialize + Validate + Send + 'static {}
impl<T> ResponseSchema for T where T: Serialize + Validate + Send + 'static {}

/// Body type for routes that take no body. Accepts anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoBody;

impl<'de> Deserialize<'de> for NoBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(NoBody)
    }
}

impl Validate for NoBody {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Param type for routes that read no params.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NoParams {}

impl Validate for NoParams {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

impl ProjectScoped for NoParams {}

type AuthorizeFn<P, B> = Arc<dyn Fn(&AuthContext, &RouteInput<P, B>) -> Option<String> + Send + Sync>;

type OperationFn<P, B, R> = Arc<
    dyn Fn(Option<Email>, RouteInput<P, B>) -> BoxFuture<'static, Result<R, OperationError>>
        + Send
        + Sync,
>;

/// One route: its input/output types, who may call it and what it does.
pub struct RouteSpec<P, B, R> {
    name: &'static str,
    auth_required: bool,
    authorize: AuthorizeFn<P, B>,
    operation: OperationFn<P, B, R>,
}

impl<P, B, R> Clone for RouteSpec<P, B, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            auth_required: self.auth_required,
            authorize: Arc::clone(&self.authorize),
            operation: Arc::clone(&self.operation),
        }
    }
}

impl<P, B, R> RouteSpec<P, B, R>
where
    P: ParamSchema,
    B: BodySchema,
    R: ResponseSchema,
{
    /// An authenticated route with no authorization rule.
    pub fn new<F, Fut>(name: &'static str, operation: F) -> Self
    where
        F: Fn(Option<Email>, RouteInput<P, B>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, OperationError>> + Send + 'static,
    {
        Self {
            name,
            auth_required: true,
            authorize: Arc::new(|_: &AuthContext, _: &RouteInput<P, B>| None),
            operation: Arc::new(move |email: Option<Email>, input: RouteInput<P, B>| {
                operation(email, input).boxed()
            }),
        }
    }

    /// Let unauthenticated callers through; the operation sees `None`.
    pub fn optional_auth(mut self) -> Self {
        self.auth_required = false;
        self
    }

    /// Deny the request when `rule` returns a reason.
    pub fn authorize<F>(mut self, rule: F) -> Self
    where
        F: Fn(&AuthContext, &RouteInput<P, B>) -> Option<String> + Send + Sync + 'static,
    {
        self.authorize = Arc::new(rule);
        self
    }
}

/// Parse a JSON body. An empty body is read as `null`.
pub fn parse_body<B>(body: &[u8]) -> Result<B, ApiError>
where
    B: DeserializeOwned + Validate,
{
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value::<B>(Value::Null)
    } else {
        serde_json::from_slice::<B>(body)
    }
    .map_err(|e| ApiError::InvalidBody(e.to_string()))?;

    parsed
        .validate()
        .map_err(|e| ApiError::InvalidBody(describe_validation_errors(&e)))?;
    Ok(parsed)
}

/// Check an outgoing value against its response schema and serialize it.
/// Nothing reaches the wire without passing through here.
pub fn respond<R: ResponseSchema>(result: &R) -> Result<Value, ApiError> {
    if let Err(errors) = result.validate() {
        let detail = describe_validation_errors(&errors);
        warn!(%detail, "operation result does not match the response schema");
        return Err(ApiError::ResponseSchema(detail));
    }
    serde_json::to_value(result).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Runs route specs. Shared by every route in the app.
#[derive(Clone)]
pub struct Dispatcher {
    authenticator: Arc<dyn Authenticator>,
    roles: Arc<dyn RoleDirectory>,
    auth_disabled: bool,
}

impl Dispatcher {
    pub fn new(authenticator: Arc<dyn Authenticator>, roles: Arc<dyn RoleDirectory>) -> Self {
        Self {
            authenticator,
            roles,
            auth_disabled: false,
        }
    }

    /// With auth disabled every caller is an admin of every project.
    pub fn with_auth_disabled(mut self, auth_disabled: bool) -> Self {
        self.auth_disabled = auth_disabled;
        self
    }

    pub async fn dispatch<P, B, R>(&self, spec: &RouteSpec<P, B, R>, request: RouteRequest) -> Response
    where
        P: ParamSchema,
        B: BodySchema,
        R: ResponseSchema,
    {
        match self.execute(spec, request).await {
            Ok(body) => (StatusCode::OK, Json(body)).into_response(),
            Err(err) => {
                let status = err.status();
                if status.is_client_error() {
                    info!(route = spec.name, %status, error = %err, "request rejected");
                }
                err.into_response()
            }
        }
    }

    #[instrument(name = "route", skip_all, fields(route = spec.name))]
    async fn execute<P, B, R>(
        &self,
        spec: &RouteSpec<P, B, R>,
        request: RouteRequest,
    ) -> Result<Value, ApiError>
    where
        P: ParamSchema,
        B: BodySchema,
        R: ResponseSchema,
    {
        let email = match self.authenticator.authenticate(&request.headers).await {
            Ok(email) => Some(email),
            Err(err) if spec.auth_required => {
                debug!(error = %err, "authentication failed");
                return Err(ApiError::Unauthenticated);
            }
            Err(err) => {
                debug!(error = %err, "continuing without identity");
                None
            }
        };

        let params: P = params::parse_params(&request.raw_params())?;
        let body: B = if request.carries_body() {
            parse_body(&request.body)?
        } else {
            parse_body(&[])?
        };

        let project_id = params.project_id();
        let role = self.resolve_role(email.as_ref(), project_id).await?;
        let input = RouteInput { params, body, role };
        let ctx = AuthContext::new(email.clone(), project_id, role);
        if let Some(reason) = (spec.authorize)(&ctx, &input) {
            return Err(ApiError::Forbidden(reason));
        }

        let result = (spec.operation)(email, input).await?;
        respond(&result)
    }

    async fn resolve_role(
        &self,
        email: Option<&Email>,
        project_id: Option<ProjectId>,
    ) -> Result<Option<Role>, ApiError> {
        let Some(project_id) = project_id else {
            return Ok(None);
        };
        if self.auth_disabled {
            return Ok(Some(Role::Admin));
        }
        let Some(email) = email else {
            return Ok(None);
        };
        Ok(self.roles.project_role(email, project_id).await?)
    }
}

pub fn get<S, P, B, R>(spec: RouteSpec<P, B, R>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<Dispatcher>: FromRef<S>,
    P: ParamSchema,
    B: BodySchema,
    R: ResponseSchema,
{
    on(MethodFilter::GET, spec)
}

pub fn post<S, P, B, R>(spec: RouteSpec<P, B, R>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<Dispatcher>: FromRef<S>,
    P: ParamSchema,
    B: BodySchema,
    R: ResponseSchema,
{
    on(MethodFilter::POST, spec)
}

pub fn patch<S, P, B, R>(spec: RouteSpec<P, B, R>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<Dispatcher>: FromRef<S>,
    P: ParamSchema,
    B: BodySchema,
    R: ResponseSchema,
{
    on(MethodFilter::PATCH, spec)
}

fn on<S, P, B, R>(filter: MethodFilter, spec: RouteSpec<P, B, R>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<Dispatcher>: FromRef<S>,
    P: ParamSchema,
    B: BodySchema,
    R: ResponseSchema,
{
    let spec = Arc::new(spec);
    axum::routing::on(
        filter,
        move |State(dispatcher): State<Arc<Dispatcher>>,
              method: Method,
              path: Option<Path<HashMap<String, String>>>,
              Query(query): Query<HashMap<String, String>>,
              headers: HeaderMap,
              body: Bytes| {
            let spec = Arc::clone(&spec);
            async move {
                let path = path.map(|Path(p)| p).unwrap_or_default();
                let request = RouteRequest::new(headers)
                    .with_method(method)
                    .with_path(path)
                    .with_query(query)
                    .with_body(body);
                dispatcher.dispatch(&spec, request).await
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::http::{HeaderValue, header};

    use crate::authz::{FORBIDDEN_MESSAGE, require_role};
    use crate::identity::AuthnError;

    struct TokenTable;

    #[async_trait]
    impl Authenticator for TokenTable {
        async fn authenticate(&self, headers: &HeaderMap) -> Result<Email, AuthnError> {
            match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                Some("Bearer ann") => Ok(Email::parse("ann@example.org").unwrap()),
                Some("Bearer bob") => Ok(Email::parse("bob@example.org").unwrap()),
                Some(_) => Err(AuthnError::MalformedHeader),
                None => Err(AuthnError::MissingToken),
            }
        }
    }

    /// ann is a manager of project 1, bob an annotator.
    struct FixedRoles;

    #[async_trait]
    impl RoleDirectory for FixedRoles {
        async fn project_role(
            &self,
            email: &Email,
            project_id: ProjectId,
        ) -> Result<Option<Role>, OperationError> {
            if project_id.get() != 1 {
                return Ok(None);
            }
            Ok(match email.as_str() {
                "ann@example.org" => Some(Role::Manager),
                "bob@example.org" => Some(Role::Annotator),
                _ => None,
            })
        }
    }

    #[derive(Debug, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    struct ProjectParams {
        #[validate(range(min = 1))]
        project_id: i64,
    }

    impl ProjectScoped for ProjectParams {
        fn project_id(&self) -> Option<ProjectId> {
            Some(ProjectId::new(self.project_id))
        }
    }

    #[derive(Debug, Deserialize, Validate)]
    struct RenameBody {
        #[validate(length(min = 1))]
        name: String,
    }

    #[derive(Debug, Serialize, Validate)]
    struct Renamed {
        #[validate(length(min = 1))]
        name: String,
        by: Option<String>,
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(TokenTable), Arc::new(FixedRoles))
    }

    fn rename_route(calls: Arc<AtomicUsize>) -> RouteSpec<ProjectParams, RenameBody, Renamed> {
        RouteSpec::new("rename", move |email: Option<Email>, input: RouteInput<ProjectParams, RenameBody>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(Renamed {
                    name: input.body.name,
                    by: email.map(|e| e.as_str().to_string()),
                })
            }
        })
        .authorize(require_role(Role::Manager))
    }

    fn request(token: Option<&str>, project: &str, body: &str) -> RouteRequest {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            );
        }
        RouteRequest::new(headers)
            .with_method(Method::POST)
            .with_path(HashMap::from([("projectId".to_string(), project.to_string())]))
            .with_body(body.to_string())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn authorized_call_runs_operation_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = rename_route(calls.clone());

        let response = dispatcher()
            .dispatch(&spec, request(Some("ann"), "1", r#"{"name":"renamed"}"#))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"name": "renamed", "by": "ann@example.org"})
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_identity_is_401_before_anything_else() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = rename_route(calls.clone());

        // Bad params and body too; authentication still decides.
        let response = dispatcher().dispatch(&spec, request(None, "abc", "{")).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_params_are_400() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = rename_route(calls.clone());

        let response = dispatcher()
            .dispatch(&spec, request(Some("ann"), "abc", r#"{"name":"x"}"#))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_body_field_is_400_even_for_low_roles() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = rename_route(calls.clone());

        let response = dispatcher().dispatch(&spec, request(Some("bob"), "1", "{}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = dispatcher().dispatch(&spec, request(Some("ann"), "1", "")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insufficient_role_is_403_unauthorized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = rename_route(calls.clone());

        let response = dispatcher()
            .dispatch(&spec, request(Some("bob"), "1", r#"{"name":"x"}"#))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": FORBIDDEN_MESSAGE})
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_members_are_forbidden() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = rename_route(calls.clone());

        let response = dispatcher()
            .dispatch(&spec, request(Some("ann"), "2", r#"{"name":"x"}"#))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auth_disabled_grants_admin() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = rename_route(calls.clone());

        let response = dispatcher()
            .with_auth_disabled(true)
            .dispatch(&spec, request(Some("bob"), "2", r#"{"name":"x"}"#))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn optional_auth_runs_anonymously() {
        let spec: RouteSpec<NoParams, NoBody, Renamed> =
            RouteSpec::new("whoami", |email: Option<Email>, _input: RouteInput<NoParams, NoBody>| async move {
                Ok(Renamed {
                    name: "anyone".to_string(),
                    by: email.map(|e| e.as_str().to_string()),
                })
            })
            .optional_auth();

        let response = dispatcher()
            .dispatch(&spec, RouteRequest::new(HeaderMap::new()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["by"], Value::Null);
    }

    #[tokio::test]
    async fn get_requests_ignore_their_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let spec: RouteSpec<ProjectParams, NoBody, Renamed> = RouteSpec::new(
            "show",
            move |_email: Option<Email>, _input: RouteInput<ProjectParams, NoBody>| {
                counted.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(Renamed {
                        name: "project".to_string(),
                        by: None,
                    })
                }
            },
        );

        let response = dispatcher()
            .dispatch(&spec, request(Some("ann"), "1", "a=b").with_method(Method::GET))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The same body on a POST is still parsed, and rejected.
        let response = dispatcher().dispatch(&spec, request(Some("ann"), "1", "a=b")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn operations_see_the_resolved_role() {
        let spec: RouteSpec<ProjectParams, NoBody, Renamed> = RouteSpec::new(
            "role",
            |_email: Option<Email>, input: RouteInput<ProjectParams, NoBody>| async move {
                Ok(Renamed {
                    name: input.role.as_ref().map_or("none", Role::as_str).to_string(),
                    by: None,
                })
            },
        );

        let response = dispatcher().dispatch(&spec, request(Some("bob"), "1", "")).await;
        assert_eq!(body_json(response).await["name"], "annotator");

        let response = dispatcher().dispatch(&spec, request(Some("bob"), "2", "")).await;
        assert_eq!(body_json(response).await["name"], "none");
    }

    #[test]
    fn respond_checks_the_response_schema() {
        let ok = Renamed {
            name: "x".to_string(),
            by: None,
        };
        assert_eq!(respond(&ok).unwrap(), serde_json::json!({"name": "x", "by": null}));

        let drifted = Renamed {
            name: String::new(),
            by: None,
        };
        assert!(matches!(respond(&drifted), Err(ApiError::ResponseSchema(_))));
    }

    #[tokio::test]
    async fn operation_errors_keep_their_status() {
        let spec: RouteSpec<NoParams, NoBody, Renamed> =
            RouteSpec::new("missing", |_email: Option<Email>, _input: RouteInput<NoParams, NoBody>| async move {
                Err(OperationError::not_found("job not found"))
            });

        let response = dispatcher()
            .dispatch(&spec, request(Some("ann"), "1", ""))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "job not found"})
        );
    }

    #[tokio::test]
    async fn unexpected_failures_are_generic_500s() {
        let spec: RouteSpec<NoParams, NoBody, Renamed> =
            RouteSpec::new("broken", |_email: Option<Email>, _input: RouteInput<NoParams, NoBody>| async move {
                Err(OperationError::internal("db connection refused"))
            });

        let response = dispatcher()
            .dispatch(&spec, request(Some("ann"), "1", ""))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Internal server error"})
        );
    }

    #[tokio::test]
    async fn results_violating_the_response_schema_are_500s() {
        let spec: RouteSpec<NoParams, NoBody, Renamed> =
            RouteSpec::new("drift", |_email: Option<Email>, _input: RouteInput<NoParams, NoBody>| async move {
                Ok(Renamed {
                    name: String::new(),
                    by: None,
                })
            });

        let response = dispatcher()
            .dispatch(&spec, request(Some("ann"), "1", ""))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
