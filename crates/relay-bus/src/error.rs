//! Bus error types.

use thiserror::Error;

/// Errors surfaced by bus backends.
///
/// "No subscribers" is never an error, and frames that fail to decode are
/// skipped inside the subscription rather than reported here.
#[derive(Debug, Error)]
pub enum BusError {
    /// The distributed backend refused or dropped the operation.
    #[error("bus backend unavailable: {0}")]
    Backend(String),

    /// The distributed backend did not answer within the configured bound.
    #[error("bus backend timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The event could not be serialized for the wire.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// `close()` has already been called on this bus.
    #[error("event bus closed")]
    Closed,
}

impl From<redis::RedisError> for BusError {
    fn from(e: redis::RedisError) -> Self {
        BusError::Backend(e.to_string())
    }
}

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;
