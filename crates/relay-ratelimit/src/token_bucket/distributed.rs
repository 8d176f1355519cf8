//! Redis-backed token bucket.
//!
//! Bucket key: `{namespace}:{identifier}`, a hash with `tokens` and `ts`.
//! Refill, decision and persistence happen in one script that reads the
//! server's `TIME`, so every worker refills against the same clock.

use super::BucketParams;
use crate::decision::{Algorithm, Decision};
use crate::degrade::{Degradation, FailurePolicy};
use crate::error::LimiterError;
use crate::limiter::{BucketLimiter, RateLimiter};
use crate::scripts;
use crate::store::RedisStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Token bucket shared by every worker pointed at the same store.
pub struct RedisTokenBucket {
    name: String,
    params: BucketParams,
    idle_ttl: Option<Duration>,
    store: Arc<RedisStore>,
    degradation: Degradation,
}

impl RedisTokenBucket {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        params: BucketParams,
        store: Arc<RedisStore>,
        policy: FailurePolicy,
    ) -> Self {
        let name = name.into();
        Self {
            degradation: Degradation::new(name.clone(), policy),
            name,
            params,
            idle_ttl: None,
            store,
        }
    }

    /// Override the derived idle expiry, raised to at least the refill time.
    #[must_use]
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn degradation(&self) -> &Degradation {
        &self.degradation
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}:{}", self.name, identifier)
    }

    fn ttl_secs(&self, params: &BucketParams) -> u64 {
        params.effective_idle_ttl(self.idle_ttl).as_secs()
    }

    /// Run the bucket script. A cost of zero only refills.
    async fn run(
        &self,
        identifier: &str,
        cost: u32,
        params: &BucketParams,
    ) -> Result<(bool, f64), LimiterError> {
        let key = self.key(identifier);
        let args = [
            params.capacity.to_string(),
            params.refill_per_sec.to_string(),
            cost.to_string(),
            self.ttl_secs(params).to_string(),
        ];

        let (allowed, tokens): (i64, String) = self
            .store
            .eval(scripts::token_bucket(), &[&key], &args)
            .await?;
        let tokens = tokens
            .parse::<f64>()
            .map_err(|e| LimiterError::Script(format!("token count {tokens:?}: {e}")))?;
        Ok((allowed == 1, tokens))
    }

    async fn consume(&self, identifier: &str, cost: u32, params: BucketParams) -> Decision {
        match self.run(identifier, cost, &params).await {
            Ok((allowed, tokens)) => {
                self.degradation.on_success();
                if !allowed {
                    debug!(limiter = %self.name, identifier, tokens, "Token bucket empty");
                }
                params.decide(allowed, tokens, cost)
            }
            Err(e) => self.degradation.on_failure(&e, u64::from(params.capacity)),
        }
    }

    async fn inspect(&self, identifier: &str, params: BucketParams) -> Decision {
        match self.run(identifier, 0, &params).await {
            Ok((_, tokens)) => {
                self.degradation.on_success();
                params.decide(true, tokens, 1)
            }
            Err(e) => self.degradation.on_failure(&e, u64::from(params.capacity)),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisTokenBucket {
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
        self.consume(identifier, cost, self.params).await
    }

    async fn peek(&self, identifier: &str) -> Decision {
        self.inspect(identifier, self.params).await
    }

    fn is_enforcing(&self) -> bool {
        !self.degradation.is_degraded()
    }

    fn fallbacks(&self) -> u64 {
        self.degradation.fallbacks()
    }
}

#[async_trait]
impl BucketLimiter for RedisTokenBucket {
    async fn check_with(&self, identifier: &str, cost: u32, params: BucketParams) -> Decision {
        self.consume(identifier, cost, params).await
    }

    async fn peek_with(&self, identifier: &str, params: BucketParams) -> Decision {
        self.inspect(identifier, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Remaining;

    fn unreachable(policy: FailurePolicy) -> RedisTokenBucket {
        let store = RedisStore::open("redis://127.0.0.1:1/", Duration::from_millis(200)).unwrap();
        RedisTokenBucket::new("tb:chan", BucketParams::new(5, 1.0).unwrap(), Arc::new(store), policy)
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(unreachable(FailurePolicy::FailOpen).key("news:1.2.3.4"), "tb:chan:news:1.2.3.4");
    }

    #[test]
    fn test_key_expiry_covers_refill_time() {
        let limiter = unreachable(FailurePolicy::FailOpen).with_idle_ttl(Duration::ZERO);
        let slow = BucketParams::new(1, 0.01).unwrap();
        assert_eq!(limiter.ttl_secs(&slow), 100);
        assert_eq!(limiter.ttl_secs(&BucketParams::new(5, 1.0).unwrap()), 5);

        let derived = unreachable(FailurePolicy::FailOpen);
        assert_eq!(derived.ttl_secs(&slow), 200);
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_permissively() {
        let limiter = unreachable(FailurePolicy::FailOpen);
        let d = limiter.check("k", 1).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, Remaining::Unbounded);
        assert_eq!(limiter.remaining("k").await, Remaining::Unbounded);
        assert!(!limiter.is_enforcing());
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_closed_when_configured() {
        let limiter = unreachable(FailurePolicy::FailClosed);
        let d = limiter.check("k", 1).await;
        assert!(!d.allowed);
        assert_eq!(d.retry_after(), 1);
    }

    #[tokio::test]
    #[ignore = "requires a Redis server on localhost:6379"]
    async fn test_live_bucket_drains_and_reports_wait() {
        let store = Arc::new(RedisStore::open("redis://127.0.0.1:6379/", Duration::from_secs(1)).unwrap());
        let name = format!("tb:test:{}", std::process::id());
        let limiter = RedisTokenBucket::new(name, BucketParams::new(3, 0.5).unwrap(), store, FailurePolicy::FailOpen);

        for expected in [2, 1, 0] {
            let d = limiter.check("k", 1).await;
            assert!(d.allowed);
            assert_eq!(d.remaining, Remaining::Finite(expected));
        }
        let denied = limiter.check("k", 1).await;
        assert!(!denied.allowed);
        assert_eq!(denied.reset_in, 2);
        assert!(limiter.is_enforcing());
    }
}
