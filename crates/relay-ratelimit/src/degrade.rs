//! # Degradation
//!
//! What a Redis-backed limiter does when its store is unreachable or slow.
//! The default policy admits the request (`fail open`) with an unbounded
//! remaining count; `fail closed` refuses instead. The transition into the
//! degraded state is logged once per outage and the transition back once on
//! recovery, so an outage does not flood the log.

use crate::decision::{Algorithm, Decision, Remaining};
use crate::error::LimiterError;
use crate::limiter::{BucketLimiter, RateLimiter};
use crate::token_bucket::BucketParams;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{error, info};

/// Behaviour while the backend is unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    FailOpen,
    FailClosed,
}

/// Degradation state of one limiter.
#[derive(Debug)]
pub struct Degradation {
    name: String,
    policy: FailurePolicy,
    degraded: AtomicBool,
    fallbacks: AtomicU64,
}

impl Degradation {
    #[must_use]
    pub fn new(name: impl Into<String>, policy: FailurePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            degraded: AtomicBool::new(false),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Record a successful backend round trip.
    pub fn on_success(&self) {
        if self.degraded.swap(false, Ordering::AcqRel) {
            info!(limiter = %self.name, "Rate-limit backend recovered, enforcing again");
        }
    }

    /// Record a failed round trip and produce the fallback decision.
    pub fn on_failure(&self, err: &LimiterError, limit: u64) -> Decision {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        if !self.degraded.swap(true, Ordering::AcqRel) {
            error!(
                limiter = %self.name,
                policy = ?self.policy,
                error = %err,
                "Rate-limit backend unavailable, degrading"
            );
        }
        match self.policy {
            FailurePolicy::FailOpen => Decision::permissive(limit),
            FailurePolicy::FailClosed => Decision::unavailable(limit),
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Decisions served by the fallback since startup.
    #[must_use]
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }
}

/// Limiter that admits everything.
///
/// Stands in when the distributed store is selected but no store is
/// configured: requests are never refused for lack of a backend.
#[derive(Debug, Clone)]
pub struct PermissiveLimiter {
    name: String,
    algorithm: Algorithm,
    limit: u64,
}

impl PermissiveLimiter {
    #[must_use]
    pub fn new(name: impl Into<String>, algorithm: Algorithm, limit: u64) -> Self {
        Self {
            name: name.into(),
            algorithm,
            limit,
        }
    }
}

#[async_trait]
impl RateLimiter for PermissiveLimiter {
    fn name(&self) -> &str {
        &self.name
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn limit(&self) -> u64 {
        self.limit
    }

    async fn check(&self, _identifier: &str, _cost: u32) -> Decision {
        Decision::permissive(self.limit)
    }

    async fn peek(&self, _identifier: &str) -> Decision {
        Decision::permissive(self.limit)
    }

    async fn remaining(&self, _identifier: &str) -> Remaining {
        Remaining::Unbounded
    }

    fn is_enforcing(&self) -> bool {
        false
    }
}

#[async_trait]
impl BucketLimiter for PermissiveLimiter {
    async fn check_with(&self, _identifier: &str, _cost: u32, params: BucketParams) -> Decision {
        Decision::permissive(u64::from(params.capacity))
    }

    async fn peek_with(&self, _identifier: &str, params: BucketParams) -> Decision {
        Decision::permissive(u64::from(params.capacity))
    }
}
