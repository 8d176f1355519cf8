//! Rate-limit decisions.

use serde::{Serialize, Serializer};
use std::fmt;

/// Which algorithm a limiter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    FixedWindow,
    TokenBucket,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedWindow => f.write_str("fixed_window"),
            Self::TokenBucket => f.write_str("token_bucket"),
        }
    }
}

/// Requests still admissible for an identifier.
///
/// `Unbounded` is reported while a limiter is degraded and not enforcing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Finite(u64),
    Unbounded,
}

impl Remaining {
    /// The count, or `None` when unbounded.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Finite(n) => Some(*n),
            Self::Unbounded => None,
        }
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Self::Unbounded)
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(n) => write!(f, "{n}"),
            Self::Unbounded => f.write_str("unlimited"),
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Finite(n) => serializer.serialize_u64(*n),
            Self::Unbounded => serializer.serialize_str("unlimited"),
        }
    }
}

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Configured limit (window limit or bucket capacity).
    pub limit: u64,
    /// What is left after this check.
    pub remaining: Remaining,
    /// Whole seconds until a request of the same cost can succeed.
    pub reset_in: u64,
}

impl Decision {
    /// Admit with no enforcement. Used while the backend is unavailable.
    #[must_use]
    pub fn permissive(limit: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: Remaining::Unbounded,
            reset_in: 0,
        }
    }

    /// Refuse because the backend is unavailable and the policy is fail-closed.
    #[must_use]
    pub fn unavailable(limit: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: Remaining::Finite(0),
            reset_in: 1,
        }
    }

    /// Seconds a denied caller should wait, never zero.
    #[must_use]
    pub fn retry_after(&self) -> u64 {
        self.reset_in.max(1)
    }
}
