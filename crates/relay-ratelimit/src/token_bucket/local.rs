//! In-process token bucket.

use super::{BucketParams, BucketState};
use crate::decision::{Algorithm, Decision};
use crate::limiter::{BucketLimiter, RateLimiter};
use crate::ports::{SystemTimeSource, TimeSource};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: BucketState,
    /// Epoch seconds after which an untouched bucket may be swept.
    expires_at: f64,
}

/// Token-bucket limiter keeping buckets in a concurrent map.
///
/// Each check refills, decides and persists under the entry's lock, so
/// concurrent checks on one identifier never over-admit.
pub struct LocalTokenBucket {
    name: String,
    params: BucketParams,
    idle_ttl: Option<Duration>,
    buckets: DashMap<String, Entry>,
    clock: Arc<dyn TimeSource>,
}

impl LocalTokenBucket {
    #[must_use]
    pub fn new(name: impl Into<String>, params: BucketParams) -> Self {
        Self::with_clock(name, params, Arc::new(SystemTimeSource))
    }

    #[must_use]
    pub fn with_clock(
        name: impl Into<String>,
        params: BucketParams,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            idle_ttl: None,
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Override the derived idle expiry. Values shorter than the bucket's
    /// refill time are raised to it.
    #[must_use]
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn params(&self) -> BucketParams {
        self.params
    }

    /// Buckets currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }

    fn now(&self) -> f64 {
        self.clock.now().as_secs_f64()
    }

    fn ttl_for(&self, params: &BucketParams) -> f64 {
        params.effective_idle_ttl(self.idle_ttl).as_secs_f64()
    }

    fn consume(&self, identifier: &str, cost: u32, params: BucketParams) -> Decision {
        let now = self.now();
        let ttl = self.ttl_for(&params);

        let mut entry = self
            .buckets
            .entry(identifier.to_string())
            .or_insert_with(|| Entry {
                state: BucketState::full(&params, now),
                expires_at: now + ttl,
            });
        // A bucket past its expiry counts as never seen.
        if entry.expires_at <= now {
            entry.state = BucketState::full(&params, now);
        }

        entry.state.refill(&params, now);
        let allowed = entry.state.try_consume(f64::from(cost));
        entry.expires_at = now + ttl;

        params.decide(allowed, entry.state.tokens, cost)
    }

    fn inspect(&self, identifier: &str, params: BucketParams) -> Decision {
        let now = self.now();
        let mut state = match self.buckets.get(identifier) {
            Some(entry) if entry.expires_at > now => entry.state,
            _ => BucketState::full(&params, now),
        };
        state.refill(&params, now);
        params.decide(true, state.tokens, 1)
    }
}

#[async_trait]
impl RateLimiter for LocalTokenBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }

    fn limit(&self) -> u64 {
        u64::from(self.params.capacity)
    }

    async fn check(&self, identifier: &str, cost: u32) -> Decision {
        self.consume(identifier, cost, self.params)
    }

    async fn peek(&self, identifier: &str) -> Decision {
        self.inspect(identifier, self.params)
    }

    fn sweep(&self) -> usize {
        let now = self.now();
        let before = self.buckets.len();
        self.buckets.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.buckets.len())
    }
}

#[async_trait]
impl BucketLimiter for LocalTokenBucket {
    async fn check_with(&self, identifier: &str, cost: u32, params: BucketParams) -> Decision {
        self.consume(identifier, cost, params)
    }

    async fn peek_with(&self, identifier: &str, params: BucketParams) -> Decision {
        self.inspect(identifier, params)
    }
}
