//! Redis-backed fixed-window limiter.
//!
//! Counter key: `{namespace}:{identifier}:{window_start}`. The increment and
//! the expiry are applied in one script so concurrent workers share a single
//! counter and the key cannot be left without a TTL.

use super::WindowParams;
use crate::decision::{Algorithm, Decision};
use crate::degrade::{Degradation, FailurePolicy};
use crate::limiter::RateLimiter;
use crate::ports::{SystemTimeSource, TimeSource};
use crate::scripts;
use crate::store::RedisStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Fixed-window limiter shared by every worker pointed at the same store.
pub struct RedisFixedWindow {
    name: String,
    params: WindowParams,
    store: Arc<RedisStore>,
    degradation: Degradation,
    clock: Arc<dyn TimeSource>,
}

impl RedisFixedWindow {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        params: WindowParams,
        store: Arc<RedisStore>,
        policy: FailurePolicy,
    ) -> Self {
        Self::with_clock(name, params, store, policy, Arc::new(SystemTimeSource))
    }

    #[must_use]
    pub fn with_clock(
        name: impl Into<String>,
        params: WindowParams,
        store: Arc<RedisStore>,
        policy: FailurePolicy,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let name = name.into();
        Self {
            degradation: Degradation::new(name.clone(), policy),
            name,
            params,
            store,
            clock,
        }
    }

    #[must_use]
    pub fn degradation(&self) -> &Degradation {
        &self.degradation
    }

    fn key(&self, identifier: &str, window_start: u64) -> String {
        format!("{}:{}:{}", self.name, identifier, window_start)
    }
}

#[async_trait]
impl RateLimiter for RedisFixedWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }

    fn limit(&self) -> u64 {
        self.params.limit
    }

    async fn check(&self, identifier: &str, cost: u32) -> Decision {
        let now = self.clock.now().as_secs();
        let key = self.key(identifier, self.params.window_start(now));
        let args = [cost.to_string(), self.params.window.to_string()];

        match self
            .store
            .eval::<u64>(scripts::fixed_window(), &[&key], &args)
            .await
        {
            Ok(count) => {
                self.degradation.on_success();
                let decision = self.params.decide(count, now);
                if !decision.allowed {
                    debug!(limiter = %self.name, identifier, count, "Fixed window exhausted");
                }
                decision
            }
            Err(e) => self.degradation.on_failure(&e, self.params.limit),
        }
    }

    async fn peek(&self, identifier: &str) -> Decision {
        let now = self.clock.now().as_secs();
        let key = self.key(identifier, self.params.window_start(now));

        match self.store.get::<Option<u64>>(&key).await {
            Ok(count) => {
                self.degradation.on_success();
                self.params.decide(count.unwrap_or(0), now)
            }
            Err(e) => self.degradation.on_failure(&e, self.params.limit),
        }
    }

    fn is_enforcing(&self) -> bool {
        !self.degradation.is_degraded()
    }

    fn fallbacks(&self) -> u64 {
        self.degradation.fallbacks()
    }
}
