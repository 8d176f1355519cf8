//! # Event Bus
//!
//! The process-wide bus service. Owns exactly one backend, chosen from
//! configuration the first time the bus is used: Redis pub/sub when a URL is
//! configured, the local bus otherwise. Callers receive the bus by
//! injection (typically inside an `Arc`), never through a global.
//!
//! Also keeps a small ring of the latest published events for "recent
//! activity" views. The ring is process-local and not durable.

use crate::backend::{BackendKind, BusBackend};
use crate::distributed::RedisBus;
use crate::error::{BusError, BusResult};
use crate::events::EventEnvelope;
use crate::local::LocalBus;
use crate::subscriber::Subscription;
use crate::{DEFAULT_BUS_CHANNEL, DEFAULT_RECENT_CAPACITY, DEFAULT_SUBSCRIBER_BUFFER};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, info};

/// Bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Redis URL. `None` selects the local bus.
    pub redis_url: Option<String>,
    /// Pub/sub channel used by the Redis backend.
    pub channel: String,
    /// Per-subscriber queue depth for the local backend.
    pub subscriber_buffer: usize,
    /// How many recent events to retain.
    pub recent_capacity: usize,
    /// Bound on every Redis round trip.
    pub backend_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            channel: DEFAULT_BUS_CHANNEL.to_string(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            backend_timeout: Duration::from_millis(250),
        }
    }
}

/// Broadcast bus service with an explicit lifecycle.
pub struct EventBus {
    config: BusConfig,
    backend: OnceLock<Arc<dyn BusBackend>>,
    recent: Mutex<VecDeque<EventEnvelope>>,
    closed: AtomicBool,
}

impl EventBus {
    /// Create the bus. The backend is selected lazily on first use.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        let recent = VecDeque::with_capacity(config.recent_capacity);
        Self {
            config,
            backend: OnceLock::new(),
            recent: Mutex::new(recent),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a bus around an already constructed backend.
    #[must_use]
    pub fn with_backend(config: BusConfig, backend: Arc<dyn BusBackend>) -> Self {
        let bus = Self::new(config);
        let _ = bus.backend.set(backend);
        bus
    }

    /// Local-only bus with default settings.
    #[must_use]
    pub fn local() -> Self {
        Self::new(BusConfig::default())
    }

    /// The selected backend, constructing it on first call.
    pub fn backend(&self) -> &Arc<dyn BusBackend> {
        self.backend.get_or_init(|| select_backend(&self.config))
    }

    /// Kind of the selected backend.
    pub fn kind(&self) -> BackendKind {
        self.backend().kind()
    }

    /// Publish an envelope. Returns once the backend accepted it.
    pub async fn publish(&self, event: EventEnvelope) -> BusResult<()> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        self.backend().publish(event.clone()).await?;
        self.remember(event);
        Ok(())
    }

    /// Publish an event built from a type and payload map.
    pub async fn publish_event(
        &self,
        event_type: impl Into<String>,
        payload: Map<String, Value>,
    ) -> BusResult<()> {
        self.publish(EventEnvelope::with_payload(event_type, payload))
            .await
    }

    /// Open a feed of events published from now on.
    pub async fn subscribe(&self) -> BusResult<Subscription> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        self.backend().subscribe().await
    }

    /// Latest events published through this process, newest first.
    ///
    /// With `channel`, only events tagged with that channel are returned.
    pub fn recent(&self, limit: usize, channel: Option<&str>) -> Vec<EventEnvelope> {
        self.recent
            .lock()
            .iter()
            .rev()
            .filter(|event| event.matches_channel(channel))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Size of the recent-events ring.
    pub fn recent_capacity(&self) -> usize {
        self.config.recent_capacity
    }

    /// Live subscriber count when the backend tracks it.
    pub fn subscriber_count(&self) -> Option<usize> {
        self.backend.get().and_then(|b| b.subscriber_count())
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the backend. Idempotent; a never-used bus has nothing to close.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(backend) = self.backend.get() {
            backend.close().await;
        }
    }

    fn remember(&self, event: EventEnvelope) {
        if self.config.recent_capacity == 0 {
            return;
        }
        let mut recent = self.recent.lock();
        if recent.len() == self.config.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(event);
    }
}

fn select_backend(config: &BusConfig) -> Arc<dyn BusBackend> {
    let Some(url) = config.redis_url.as_deref() else {
        info!(buffer = config.subscriber_buffer, "Using local event bus");
        return Arc::new(LocalBus::with_buffer(config.subscriber_buffer));
    };

    match RedisBus::open(url, config.channel.clone(), config.backend_timeout) {
        Ok(bus) => {
            info!(channel = %config.channel, "Using Redis event bus");
            Arc::new(bus)
        }
        Err(e) => {
            error!(error = %e, "Invalid Redis URL for event bus, falling back to local bus");
            Arc::new(LocalBus::with_buffer(config.subscriber_buffer))
        }
    }
}
