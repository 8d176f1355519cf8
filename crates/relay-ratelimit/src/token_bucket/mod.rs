//! # Token Bucket
//!
//! Each identifier owns a bucket of at most `capacity` tokens that refills
//! continuously at `refill_per_sec`. A request of cost `c` is admitted iff
//! the bucket holds at least `c` tokens after refilling, and then removes
//! them. Refill is computed lazily from the elapsed time on every check, and
//! the refreshed state is persisted whether or not the request is admitted.
//!
//! Idle buckets expire after `max(30, ceil(2 * capacity / refill_per_sec))`
//! seconds. An explicit idle TTL may shorten that, but never below the time
//! an empty bucket takes to refill, so expiry can only forget a full bucket.

mod distributed;
mod local;

pub use distributed::RedisTokenBucket;
pub use local::LocalTokenBucket;

use crate::decision::{Decision, Remaining};
use crate::error::{LimiterError, LimiterResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Floor applied to the derived idle TTL.
pub const MIN_IDLE_TTL_SECS: u64 = 30;

/// Guards against `2.9999999` tokens reading as 2 remaining.
const REMAINING_EPSILON: f64 = 1e-6;

/// Capacity and refill rate of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketParams {
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_sec: f64,
}

impl BucketParams {
    pub fn new(capacity: u32, refill_per_sec: f64) -> LimiterResult<Self> {
        let params = Self {
            capacity,
            refill_per_sec,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> LimiterResult<()> {
        if self.capacity == 0 {
            return Err(LimiterError::InvalidConfig(
                "bucket capacity must be positive".into(),
            ));
        }
        if !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return Err(LimiterError::InvalidConfig(
                "refill rate must be a positive number".into(),
            ));
        }
        Ok(())
    }

    /// Derived idle expiry: `max(30, ceil(2 * capacity / refill))` seconds.
    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        let secs = (2.0 * f64::from(self.capacity) / self.refill_per_sec).ceil();
        let secs = if secs.is_finite() { secs as u64 } else { u64::MAX };
        Duration::from_secs(secs.max(MIN_IDLE_TTL_SECS))
    }

    /// Whole seconds for an empty bucket to refill: `ceil(capacity / refill)`.
    #[must_use]
    pub fn refill_time(&self) -> Duration {
        let secs = (f64::from(self.capacity) / self.refill_per_sec).ceil();
        let secs = if secs.is_finite() { secs as u64 } else { u64::MAX };
        Duration::from_secs(secs.max(1))
    }

    /// Idle expiry to apply: the override clamped to at least
    /// [`refill_time`](Self::refill_time), or the derived [`idle_ttl`](Self::idle_ttl).
    #[must_use]
    pub fn effective_idle_ttl(&self, idle_override: Option<Duration>) -> Duration {
        match idle_override {
            Some(ttl) => ttl.max(self.refill_time()),
            None => self.idle_ttl(),
        }
    }

    /// Build the decision for a bucket holding `tokens` after the check.
    ///
    /// `reset_in` is how long until another request of `cost` is affordable.
    #[must_use]
    pub fn decide(&self, allowed: bool, tokens: f64, cost: u32) -> Decision {
        Decision {
            allowed,
            limit: u64::from(self.capacity),
            remaining: Remaining::Finite(remaining_tokens(tokens)),
            reset_in: wait_secs(tokens, f64::from(cost), self.refill_per_sec),
        }
    }
}

/// Persisted bucket state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub tokens: f64,
    /// Epoch seconds of the last refill.
    pub last_refill: f64,
}

impl BucketState {
    /// A bucket first seen at `now` starts full.
    #[must_use]
    pub fn full(params: &BucketParams, now: f64) -> Self {
        Self {
            tokens: f64::from(params.capacity),
            last_refill: now,
        }
    }

    /// Add the tokens earned since the last refill, clamped to `[0, capacity]`.
    pub fn refill(&mut self, params: &BucketParams, now: f64) {
        if now > self.last_refill {
            let earned = (now - self.last_refill) * params.refill_per_sec;
            self.tokens += earned;
            self.last_refill = now;
        }
        self.tokens = self.tokens.clamp(0.0, f64::from(params.capacity));
    }

    /// Remove `cost` tokens if available, with the same float tolerance as
    /// [`remaining_tokens`] so a reported remaining of `n` always affords `n`.
    pub fn try_consume(&mut self, cost: f64) -> bool {
        if self.tokens + REMAINING_EPSILON >= cost {
            self.tokens = (self.tokens - cost).max(0.0);
            true
        } else {
            false
        }
    }
}

/// Whole tokens available, tolerant of float error.
#[must_use]
pub fn remaining_tokens(tokens: f64) -> u64 {
    (tokens + REMAINING_EPSILON).floor().max(0.0) as u64
}

/// Whole seconds until `tokens` grows to `cost`.
#[must_use]
pub fn wait_secs(tokens: f64, cost: f64, refill_per_sec: f64) -> u64 {
    if tokens + REMAINING_EPSILON >= cost {
        return 0;
    }
    if refill_per_sec <= 0.0 {
        return u64::MAX;
    }
    ((cost - tokens) / refill_per_sec).ceil().max(0.0) as u64
}
