//! Rate limiter error types.
//!
//! Limiter errors never reach request handlers directly: the Redis-backed
//! limiters convert them into a degraded decision (see [`crate::degrade`]).

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a rate-limit backend.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// Store could not be reached or rejected the command.
    #[error("Rate-limit backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Round trip exceeded the configured bound.
    #[error("Rate-limit backend timed out after {0:?}")]
    Timeout(Duration),

    /// Atomic script returned something unexpected.
    #[error("Rate-limit script error: {0}")]
    Script(String),

    /// Parameters that no limiter can enforce.
    #[error("Invalid rate-limit configuration: {0}")]
    InvalidConfig(String),
}

impl From<redis::RedisError> for LimiterError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::ResponseError
            || err.kind() == redis::ErrorKind::TypeError
        {
            Self::Script(err.to_string())
        } else {
            Self::BackendUnavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LimiterError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Result type for limiter backends.
pub type LimiterResult<T> = Result<T, LimiterError>;
