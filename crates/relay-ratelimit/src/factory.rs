//! Builds limiters for the configured store mode.

use crate::channel::{ChannelLimits, ChannelRegistry};
use crate::decision::Algorithm;
use crate::degrade::{FailurePolicy, PermissiveLimiter};
use crate::error::LimiterError;
use crate::fixed_window::{LocalFixedWindow, RedisFixedWindow, WindowParams};
use crate::limiter::{BucketLimiter, RateLimiter};
use crate::ports::{SystemTimeSource, TimeSource};
use crate::store::RedisStore;
use crate::token_bucket::{BucketParams, LocalTokenBucket, RedisTokenBucket};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Where limiter state lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Shared store; falls back to permissive limiters without a URL.
    #[default]
    Redis,
    /// Process-local maps.
    Memory,
}

impl FromStr for StoreMode {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "local" => Ok(Self::Memory),
            other => Err(LimiterError::InvalidConfig(format!(
                "unknown rate-limit store {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for StoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redis => f.write_str("redis"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Constructs limiters and the channel registry from one set of settings.
pub struct LimiterFactory {
    mode: StoreMode,
    policy: FailurePolicy,
    store: Option<Arc<RedisStore>>,
    clock: Arc<dyn TimeSource>,
    idle_ttl: Option<Duration>,
}

impl LimiterFactory {
    #[must_use]
    pub fn new(mode: StoreMode, policy: FailurePolicy, store: Option<Arc<RedisStore>>) -> Self {
        if mode == StoreMode::Redis && store.is_none() {
            warn!("Rate limiting configured for Redis but no store is set, limits are not enforced");
        }
        Self {
            mode,
            policy,
            store,
            clock: Arc::new(SystemTimeSource),
            idle_ttl: None,
        }
    }

    /// In-process limiters only.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(StoreMode::Memory, FailurePolicy::FailOpen, None)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Fixed idle expiry for token buckets instead of the derived one.
    /// Each bucket raises it to at least its own refill time.
    #[must_use]
    pub fn with_idle_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.idle_ttl = ttl;
        self
    }

    #[must_use]
    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    #[must_use]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    fn distributed_store(&self) -> Option<&Arc<RedisStore>> {
        match self.mode {
            StoreMode::Redis => self.store.as_ref(),
            StoreMode::Memory => None,
        }
    }

    /// Whether limits are enforced at all.
    #[must_use]
    pub fn is_enforcing(&self) -> bool {
        self.mode == StoreMode::Memory || self.store.is_some()
    }

    pub fn fixed_window(&self, name: &str, params: WindowParams) -> Arc<dyn RateLimiter> {
        match (self.mode, self.distributed_store()) {
            (StoreMode::Memory, _) => Arc::new(LocalFixedWindow::with_clock(
                name,
                params,
                self.clock.clone(),
            )),
            (StoreMode::Redis, Some(store)) => Arc::new(RedisFixedWindow::with_clock(
                name,
                params,
                store.clone(),
                self.policy,
                self.clock.clone(),
            )),
            (StoreMode::Redis, None) => Arc::new(PermissiveLimiter::new(
                name,
                Algorithm::FixedWindow,
                params.limit,
            )),
        }
    }

    pub fn token_bucket(&self, name: &str, params: BucketParams) -> Arc<dyn BucketLimiter> {
        match (self.mode, self.distributed_store()) {
            (StoreMode::Memory, _) => {
                let bucket = LocalTokenBucket::with_clock(name, params, self.clock.clone());
                Arc::new(match self.idle_ttl {
                    Some(ttl) => bucket.with_idle_ttl(ttl),
                    None => bucket,
                })
            }
            (StoreMode::Redis, Some(store)) => {
                let bucket = RedisTokenBucket::new(name, params, store.clone(), self.policy);
                Arc::new(match self.idle_ttl {
                    Some(ttl) => bucket.with_idle_ttl(ttl),
                    None => bucket,
                })
            }
            (StoreMode::Redis, None) => Arc::new(PermissiveLimiter::new(
                name,
                Algorithm::TokenBucket,
                u64::from(params.capacity),
            )),
        }
    }

    /// Channel registry backed by the same store as the limiters.
    #[must_use]
    pub fn channel_registry(&self, defaults: ChannelLimits) -> ChannelRegistry {
        match self.distributed_store() {
            Some(store) => ChannelRegistry::distributed(store.clone(), defaults),
            None => ChannelRegistry::local(defaults),
        }
    }
}
