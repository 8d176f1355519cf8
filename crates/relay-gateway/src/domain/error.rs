//! Relay error types.
//!
//! `ApiError` is what handlers and middleware return to HTTP clients;
//! `GatewayError` covers startup and lifecycle failures.

use crate::domain::config::ConfigError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_bus::BusError;
use relay_ratelimit::LimiterError;
use serde_json::{Map, Value};
use std::fmt;

/// Machine-readable error codes carried in the `error` field.
pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// HTTP-facing error
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Response status
    pub status: StatusCode,
    /// Error code
    pub code: &'static str,
    /// Human-readable detail
    pub message: String,
    /// Extra fields merged into the body
    pub data: Option<Map<String, Value>>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach an extra body field
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// Malformed request body or parameters
    pub fn bad_request(details: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, details)
    }

    /// Missing or invalid credential
    pub fn unauthorized(details: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, details)
    }

    pub fn not_found(details: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, details)
    }

    /// Rate limited
    pub fn rate_limited(retry_in_s: u64) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::RATE_LIMITED,
            "Rate limit exceeded",
        )
        .with_field("retry_in_s", retry_in_s)
    }

    /// Dependency unavailable (bus closed, store down)
    pub fn unavailable(details: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, codes::UNAVAILABLE, details)
    }

    /// Internal error
    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            details,
        )
    }

    /// JSON body: `{"ok": false, "error": code, "detail": message, ...data}`
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("ok".into(), Value::Bool(false));
        body.insert("error".into(), Value::from(self.code));
        body.insert("detail".into(), Value::from(self.message.clone()));
        if let Some(data) = &self.data {
            for (k, v) in data {
                body.insert(k.clone(), v.clone());
            }
        }
        Value::Object(body)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

// Conversions from common error types

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::bad_request(format!("invalid JSON body: {e}"))
    }
}

impl From<BusError> for ApiError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::Encode(e) => ApiError::bad_request(e.to_string()),
            other => ApiError::unavailable(other.to_string()),
        }
    }
}

impl From<LimiterError> for ApiError {
    fn from(e: LimiterError) -> Self {
        match e {
            LimiterError::InvalidConfig(msg) => ApiError::bad_request(msg),
            other => ApiError::unavailable(other.to_string()),
        }
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Relay startup and lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialised
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Server terminated with an I/O error
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    /// `start` called twice
    #[error("service already started")]
    AlreadyStarted,
}
