//! Rate-limit decision middleware.
//!
//! Per request: identify the client, and if the path falls under one of the
//! configured scopes, consume from the limiter before forwarding. A denial
//! short-circuits with `429` and `Retry-After` without reaching the handler.
//! An admitted request is forwarded, then the limiter is read again so the
//! `X-RateLimit-*` headers reflect the state after the handler ran.
//! Requests outside every scope skip rate accounting entirely.

use crate::domain::error::ApiError;
use crate::middleware::auth::{path_in_scope, presented_token};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use relay_ratelimit::{Decision, RateLimiter};
use sha2::{Digest, Sha256};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Which paths are accounted and by which limiter
pub struct RateLimitPolicy {
    limiter: Arc<dyn RateLimiter>,
    scopes: Vec<String>,
}

impl RateLimitPolicy {
    pub fn new(limiter: Arc<dyn RateLimiter>, scopes: Vec<String>) -> Self {
        Self { limiter, scopes }
    }

    pub fn in_scope(&self, path: &str) -> bool {
        self.scopes.iter().any(|scope| path_in_scope(path, scope))
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }
}

/// Rate limit layer
#[derive(Clone)]
pub struct RateLimitLayer {
    policy: Arc<RateLimitPolicy>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<dyn RateLimiter>, scopes: Vec<String>) -> Self {
        Self {
            policy: Arc::new(RateLimitPolicy::new(limiter, scopes)),
        }
    }

    pub fn policy(&self) -> Arc<RateLimitPolicy> {
        Arc::clone(&self.policy)
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            policy: Arc::clone(&self.policy),
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    policy: Arc<RateLimitPolicy>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let policy = Arc::clone(&self.policy);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !policy.in_scope(req.uri().path()) {
                return inner.call(req).await;
            }

            let identifier = client_identifier(req.headers(), peer_addr(&req));
            let decision = policy.limiter.check(&identifier, 1).await;

            if !decision.allowed {
                debug!(
                    identifier = %identifier,
                    path = %req.uri().path(),
                    retry_after = decision.retry_after(),
                    "Rate limit exceeded"
                );
                return Ok(rate_limited_response(&decision));
            }

            let mut response = inner.call(req).await?;
            let after = policy.limiter.peek(&identifier).await;
            apply_rate_limit_headers(response.headers_mut(), &after);
            Ok(response)
        })
    }
}

fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Client address: first `X-Forwarded-For` entry, then `X-Real-IP`, then
/// the socket peer.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    // Take the first IP (original client)
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
    {
        return ip.to_string();
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip.to_string();
    }

    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

/// Rate-limit identity: a fingerprint of the API key if one is presented,
/// else the address. The key itself never reaches store keys or logs.
pub fn client_identifier(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    match presented_token(headers) {
        Some(key) if !key.is_empty() => format!("key:{}", key_fingerprint(key)),
        _ => client_address(headers, peer),
    }
}

/// First 16 hex digits of the key's SHA-256.
pub fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

/// Attach `X-RateLimit-Limit/Remaining/Reset`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    if let Ok(remaining) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert(X_RATELIMIT_REMAINING, remaining);
    }
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_in));
}

/// `429` with the rate-limit headers and `Retry-After`.
pub fn rate_limited_response(decision: &Decision) -> Response {
    let retry_after = decision.retry_after();
    let mut response = ApiError::rate_limited(retry_after).into_response();
    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, decision);
    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(retry_after),
    );
    response
}
