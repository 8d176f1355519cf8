//! # Local Bus
//!
//! Process-local fan-out over one bounded queue per subscriber.
//!
//! `publish` walks the registry and performs a non-blocking enqueue into
//! every queue, so its cost is O(subscribers) and independent of how fast
//! any subscriber drains. A full queue loses that one event; a closed
//! queue (subscriber gone) is pruned.

use crate::backend::{BackendKind, BusBackend};
use crate::error::{BusError, BusResult};
use crate::events::EventEnvelope;
use crate::subscriber::{Subscription, SubscriptionId};
use crate::DEFAULT_SUBSCRIBER_BUFFER;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::debug;

/// Subscriber queues keyed by subscription id.
#[derive(Default)]
struct Registry {
    queues: Mutex<HashMap<SubscriptionId, mpsc::Sender<EventEnvelope>>>,
}

/// In-process bus. Suitable for development and single-worker deployments.
pub struct LocalBus {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    buffer: usize,
    closed: AtomicBool,
    events_published: AtomicU64,
    events_dropped: AtomicU64,
}

impl LocalBus {
    /// Create a local bus with the default per-subscriber buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Create a local bus whose subscriber queues hold `buffer` events.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            closed: AtomicBool::new(false),
            events_published: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    /// Number of registered subscriber queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.queues.lock().len()
    }

    /// Whether no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-subscriber queue depth.
    #[must_use]
    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Total events accepted by `publish`.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Deliveries skipped because a subscriber's queue was full.
    #[must_use]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusBackend for LocalBus {
    async fn publish(&self, event: EventEnvelope) -> BusResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let mut queues = self.registry.queues.lock();
        let mut gone = Vec::new();

        for (id, queue) in queues.iter() {
            match queue.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.events_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(subscription = id, event_type = %event.event_type, "Subscriber queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }

        for id in gone {
            queues.remove(&id);
            debug!(subscription = id, "Pruned departed subscriber");
        }

        debug!(
            event_type = %event.event_type,
            subscribers = queues.len(),
            "Event published"
        );
        Ok(())
    }

    async fn subscribe(&self) -> BusResult<Subscription> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.registry.queues.lock().insert(id, tx);

        debug!(subscription = id, "Local subscription opened");

        let feed = LocalFeed {
            rx,
            _registration: Registration {
                id,
                registry: Arc::downgrade(&self.registry),
            },
        };
        Ok(Subscription::new(id, feed.boxed()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the senders ends every open feed.
        let dropped = {
            let mut queues = self.registry.queues.lock();
            let n = queues.len();
            queues.clear();
            n
        };
        debug!(subscribers = dropped, "Local bus closed");
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn subscriber_count(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// Removes its queue from the registry when the feed is dropped.
struct Registration {
    id: SubscriptionId,
    registry: Weak<Registry>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.queues.lock().remove(&self.id);
        }
        debug!(subscription = self.id, "Local subscription released");
    }
}

/// Receiving half of a local subscription.
struct LocalFeed {
    rx: mpsc::Receiver<EventEnvelope>,
    _registration: Registration,
}

impl Stream for LocalFeed {
    type Item = EventEnvelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::time::timeout;

    fn event(n: usize) -> EventEnvelope {
        EventEnvelope::new("message").field("n", n)
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = LocalBus::new();
        assert!(bus.publish(event(0)).await.is_ok());
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_subscriber_in_order() {
        let bus = LocalBus::new();
        let mut subs = Vec::new();
        for _ in 0..8 {
            subs.push(bus.subscribe().await.unwrap());
        }

        for n in 0..5 {
            bus.publish(event(n)).await.unwrap();
        }

        for sub in &mut subs {
            for n in 0..5 {
                let got = timeout(Duration::from_millis(100), sub.recv())
                    .await
                    .expect("timeout")
                    .expect("event");
                assert_eq!(got.payload["n"], n);
            }
            assert!(sub.try_next_pending());
        }
    }

    #[tokio::test]
    async fn test_only_events_after_subscribe_are_seen() {
        let bus = LocalBus::new();
        bus.publish(event(0)).await.unwrap();

        let mut sub = bus.subscribe().await.unwrap();
        bus.publish(event(1)).await.unwrap();

        let got = timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.payload["n"], 1);
    }

    #[tokio::test]
    async fn test_stalled_subscriber_never_blocks_publish() {
        let bus = LocalBus::with_buffer(2);
        let mut stalled = bus.subscribe().await.unwrap();
        let mut active = bus.subscribe().await.unwrap();

        let started = Instant::now();
        for n in 0..2 {
            bus.publish(event(n)).await.unwrap();
            active.recv().await.unwrap();
        }
        for n in 2..500 {
            bus.publish(event(n)).await.unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        // The stalled subscriber keeps what fit in its queue and stays registered.
        assert_eq!(stalled.recv().await.unwrap().payload["n"], 0);
        assert_eq!(stalled.recv().await.unwrap().payload["n"], 1);
        assert_eq!(bus.len(), 2);
        assert!(bus.events_dropped() > 0);
    }

    #[tokio::test]
    async fn test_drop_releases_registration() {
        let bus = LocalBus::new();
        {
            let _a = bus.subscribe().await.unwrap();
            let _b = bus.subscribe().await.unwrap();
            assert_eq!(bus.len(), 2);
        }
        assert!(bus.is_empty());
        assert!(bus.publish(event(0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_consumer_releases_registration() {
        let bus = Arc::new(LocalBus::new());
        let sub = bus.subscribe().await.unwrap();
        assert_eq!(bus.len(), 1);

        let handle = tokio::spawn(async move {
            let mut sub = sub;
            sub.recv().await
        });
        handle.abort();
        let _ = handle.await;

        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_close_ends_feeds_and_is_idempotent() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe().await.unwrap();

        bus.close().await;
        bus.close().await;

        assert!(sub.recv().await.is_none());
        assert!(matches!(bus.publish(event(0)).await, Err(BusError::Closed)));
        assert!(matches!(bus.subscribe().await, Err(BusError::Closed)));
    }

    trait PendingExt {
        fn try_next_pending(&mut self) -> bool;
    }

    impl PendingExt for Subscription {
        /// True when no further event is immediately available.
        fn try_next_pending(&mut self) -> bool {
            use futures::FutureExt;
            self.recv().now_or_never().is_none()
        }
    }
}
