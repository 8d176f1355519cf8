//! # Channel Limits
//!
//! Per-channel token-bucket parameters, created with defaults the first time
//! a channel is used. With a store the limits live under
//! `ratelimit_config:<channel>` as JSON so every worker agrees on them;
//! without one they are kept in process.
//!
//! Creation is decided atomically (`SET NX` or a map entry), so exactly one
//! caller observes the channel being opened and notifies.

use crate::error::{LimiterError, LimiterResult};
use crate::ports::ChannelOpenedNotifier;
use crate::store::RedisStore;
use crate::token_bucket::BucketParams;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Store key prefix for channel limits.
pub const CHANNEL_LIMITS_PREFIX: &str = "ratelimit_config";

/// Default bucket capacity for a new channel.
pub const DEFAULT_CHANNEL_CAPACITY: u32 = 5;

/// Default refill rate (tokens per second) for a new channel.
pub const DEFAULT_CHANNEL_REFILL_PER_SEC: f64 = 0.5;

/// Token-bucket limits of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLimits {
    pub capacity: u32,
    #[serde(alias = "refill_rate")]
    pub refill_per_sec: f64,
}

impl ChannelLimits {
    pub fn validate(&self) -> LimiterResult<()> {
        self.params().validate()
    }

    #[must_use]
    pub fn params(&self) -> BucketParams {
        BucketParams {
            capacity: self.capacity,
            refill_per_sec: self.refill_per_sec,
        }
    }
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
            refill_per_sec: DEFAULT_CHANNEL_REFILL_PER_SEC,
        }
    }
}

/// Registry of channel limits.
pub struct ChannelRegistry {
    store: Option<Arc<RedisStore>>,
    local: DashMap<String, ChannelLimits>,
    defaults: ChannelLimits,
    notifier: Option<Arc<dyn ChannelOpenedNotifier>>,
}

impl ChannelRegistry {
    /// In-process registry.
    #[must_use]
    pub fn local(defaults: ChannelLimits) -> Self {
        Self {
            store: None,
            local: DashMap::new(),
            defaults,
            notifier: None,
        }
    }

    /// Registry shared through the store.
    #[must_use]
    pub fn distributed(store: Arc<RedisStore>, defaults: ChannelLimits) -> Self {
        Self {
            store: Some(store),
            ..Self::local(defaults)
        }
    }

    /// Announce newly opened channels through `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ChannelOpenedNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn defaults(&self) -> ChannelLimits {
        self.defaults
    }

    /// Limits of `channel`, or the defaults if it was never opened.
    pub async fn get(&self, channel: &str) -> ChannelLimits {
        let Some(store) = &self.store else {
            return self
                .local
                .get(channel)
                .map_or(self.defaults, |limits| *limits);
        };

        match store.get::<Option<String>>(&key(channel)).await {
            Ok(Some(raw)) => self.parse(channel, &raw),
            Ok(None) => self.defaults,
            Err(e) => {
                warn!(channel, error = %e, "Channel limits unavailable, using defaults");
                self.defaults
            }
        }
    }

    /// Limits of `channel`, creating them with the defaults on first use.
    pub async fn get_or_init(&self, channel: &str) -> ChannelLimits {
        let (limits, created) = match &self.store {
            None => self.init_local(channel),
            Some(store) => self.init_in_store(store, channel).await,
        };

        if created {
            info!(
                channel,
                capacity = limits.capacity,
                refill_per_sec = limits.refill_per_sec,
                "Channel opened"
            );
            if let Some(notifier) = &self.notifier {
                notifier.channel_opened(channel, &limits).await;
            }
        }
        limits
    }

    /// Replace the limits of `channel`.
    pub async fn set(&self, channel: &str, limits: ChannelLimits) -> LimiterResult<()> {
        limits.validate()?;
        match &self.store {
            None => {
                self.local.insert(channel.to_string(), limits);
            }
            Some(store) => {
                let raw = serde_json::to_string(&limits)?;
                store.set(&key(channel), &raw).await?;
            }
        }
        info!(
            channel,
            capacity = limits.capacity,
            refill_per_sec = limits.refill_per_sec,
            "Channel limits updated"
        );
        Ok(())
    }

    fn init_local(&self, channel: &str) -> (ChannelLimits, bool) {
        match self.local.entry(channel.to_string()) {
            Entry::Occupied(entry) => (*entry.get(), false),
            Entry::Vacant(entry) => {
                entry.insert(self.defaults);
                (self.defaults, true)
            }
        }
    }

    async fn init_in_store(&self, store: &RedisStore, channel: &str) -> (ChannelLimits, bool) {
        let key = key(channel);
        let result: LimiterResult<(ChannelLimits, bool)> = async {
            let raw = serde_json::to_string(&self.defaults)?;
            if store.set_if_absent(&key, &raw).await? {
                return Ok((self.defaults, true));
            }
            let existing: Option<String> = store.get(&key).await?;
            Ok((
                existing.map_or(self.defaults, |raw| self.parse(channel, &raw)),
                false,
            ))
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!(channel, error = %e, "Channel limits unavailable, using defaults");
            (self.defaults, false)
        })
    }

    fn parse(&self, channel: &str, raw: &str) -> ChannelLimits {
        match serde_json::from_str::<ChannelLimits>(raw) {
            Ok(limits) if limits.validate().is_ok() => limits,
            Ok(_) | Err(_) => {
                warn!(channel, raw, "Malformed channel limits, using defaults");
                self.defaults
            }
        }
    }
}

fn key(channel: &str) -> String {
    format!("{CHANNEL_LIMITS_PREFIX}:{channel}")
}

impl From<ChannelLimits> for BucketParams {
    fn from(limits: ChannelLimits) -> Self {
        limits.params()
    }
}

impl TryFrom<BucketParams> for ChannelLimits {
    type Error = LimiterError;

    fn try_from(params: BucketParams) -> LimiterResult<Self> {
        params.validate()?;
        Ok(Self {
            capacity: params.capacity,
            refill_per_sec: params.refill_per_sec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        opened: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChannelOpenedNotifier for Recorder {
        async fn channel_opened(&self, channel: &str, _limits: &ChannelLimits) {
            self.opened.lock().push(channel.to_string());
        }
    }

    #[test]
    fn test_defaults() {
        let limits = ChannelLimits::default();
        assert_eq!(limits.capacity, 5);
        assert_eq!(limits.refill_per_sec, 0.5);
    }

    #[test]
    fn test_accepts_legacy_field_name() {
        let limits: ChannelLimits =
            serde_json::from_str(r#"{"capacity": 10, "refill_rate": 2.0}"#).unwrap();
        assert_eq!(limits.refill_per_sec, 2.0);
    }

    #[tokio::test]
    async fn test_first_use_creates_and_notifies_once() {
        let recorder = Arc::new(Recorder::default());
        let registry = ChannelRegistry::local(ChannelLimits::default()).with_notifier(recorder.clone());

        let first = registry.get_or_init("news").await;
        let second = registry.get_or_init("news").await;

        assert_eq!(first, second);
        assert_eq!(*recorder.opened.lock(), vec!["news".to_string()]);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let registry = ChannelRegistry::local(ChannelLimits::default());
        let limits = ChannelLimits {
            capacity: 20,
            refill_per_sec: 4.0,
        };
        registry.set("news", limits).await.unwrap();

        assert_eq!(registry.get("news").await, limits);
        assert_eq!(registry.get("other").await, ChannelLimits::default());
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_limits() {
        let registry = ChannelRegistry::local(ChannelLimits::default());
        let invalid = ChannelLimits {
            capacity: 0,
            refill_per_sec: 1.0,
        };
        assert!(matches!(
            registry.set("news", invalid).await,
            Err(LimiterError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_uses_defaults_without_notifying() {
        let store = RedisStore::open("redis://127.0.0.1:1/", Duration::from_millis(200)).unwrap();
        let recorder = Arc::new(Recorder::default());
        let registry = ChannelRegistry::distributed(Arc::new(store), ChannelLimits::default())
            .with_notifier(recorder.clone());

        assert_eq!(registry.get_or_init("news").await, ChannelLimits::default());
        assert_eq!(registry.get("news").await, ChannelLimits::default());
        assert!(recorder.opened.lock().is_empty());
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(key("news"), "ratelimit_config:news");
    }
}
