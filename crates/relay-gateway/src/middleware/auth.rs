//! Authentication for privileged routes.
//!
//! A route is privileged when its method and path match one of the
//! configured [`ProtectedRoute`]s. Privileged requests must carry the shared
//! publish token as `X-API-Key` or `Authorization: Bearer`. When no token is
//! configured every privileged request is refused. Unprivileged requests
//! pass through untouched.

use crate::domain::error::ApiError;
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::task::{Context, Poll};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::debug;

/// Method and path prefix of a privileged route
#[derive(Debug, Clone)]
pub struct ProtectedRoute {
    /// `None` matches every method
    pub method: Option<Method>,
    pub prefix: String,
}

impl ProtectedRoute {
    pub fn new(method: Option<Method>, prefix: impl Into<String>) -> Self {
        Self {
            method,
            prefix: prefix.into(),
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method) && path_in_scope(path, &self.prefix)
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Shared secret (None = privileged routes closed)
    pub token: Option<String>,
    /// Routes requiring the secret
    pub protected: Vec<ProtectedRoute>,
}

impl AuthConfig {
    /// The relay's privileged routes guarded by `token`.
    pub fn relay(token: Option<String>) -> Self {
        Self {
            token,
            protected: vec![
                ProtectedRoute::new(Some(Method::POST), "/publish"),
                ProtectedRoute::new(Some(Method::PUT), "/channels"),
                ProtectedRoute::new(None, "/ops"),
            ],
        }
    }

    pub fn is_protected(&self, method: &Method, path: &str) -> bool {
        self.protected.iter().any(|r| r.matches(method, path))
    }
}

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    config: Arc<AuthConfig>,
}

impl AuthLayer {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    config: Arc<AuthConfig>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if config.is_protected(req.method(), req.uri().path())
                && !check_token(req.headers(), config.token.as_deref())
            {
                debug!(
                    method = %req.method(),
                    path = %req.uri().path(),
                    "Privileged request rejected"
                );
                return Ok(ApiError::unauthorized("valid publish token required").into_response());
            }

            inner.call(req).await
        })
    }
}

/// Whether `path` is `prefix` or below it.
pub fn path_in_scope(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Credential presented by the client, if any.
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim());
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

fn check_token(headers: &HeaderMap, expected: Option<&str>) -> bool {
    match (expected, presented_token(headers)) {
        (Some(expected), Some(presented)) => constant_time_compare(presented, expected),
        _ => false,
    }
}

/// Compare two secrets without leaking the mismatch position.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
