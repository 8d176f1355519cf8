//! # Redis Bus
//!
//! Distributed fan-out over a single Redis pub/sub channel. Any process can
//! publish and every subscribed process receives.
//!
//! Publishing goes through one shared, lazily-connected multiplexed
//! connection; every `subscribe()` opens its own dedicated pub/sub
//! connection which is closed when the subscription is dropped. Frames
//! that fail to decode are skipped without ending the feed.
//!
//! No ordering is guaranteed across publishing processes; only the order
//! produced by one publishing connection is preserved.

use crate::backend::{BackendKind, BusBackend};
use crate::error::{BusError, BusResult};
use crate::events::EventEnvelope;
use crate::subscriber::Subscription;
use async_trait::async_trait;
use futures::{future, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

/// Redis pub/sub backed bus.
pub struct RedisBus {
    client: redis::Client,
    channel: String,
    timeout: Duration,
    publisher: Mutex<Option<ConnectionManager>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    next_id: AtomicU64,
}

impl RedisBus {
    /// Prepare a bus for `url`. No connection is made until first use.
    pub fn open(url: &str, channel: impl Into<String>, timeout: Duration) -> BusResult<Self> {
        let client = redis::Client::open(url)?;
        let (closed_tx, _) = watch::channel(false);
        Ok(Self {
            client,
            channel: channel.into(),
            timeout,
            publisher: Mutex::new(None),
            closed: AtomicBool::new(false),
            closed_tx,
            next_id: AtomicU64::new(1),
        })
    }

    /// Pub/sub channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn bounded<T, F>(&self, fut: F) -> BusResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| BusError::Timeout(self.timeout))?
            .map_err(BusError::from)
    }

    async fn publisher(&self) -> BusResult<ConnectionManager> {
        let mut slot = self.publisher.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .bounded(self.client.get_connection_manager())
            .await?;
        info!(channel = %self.channel, "Connected Redis bus publisher");
        *slot = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl BusBackend for RedisBus {
    async fn publish(&self, event: EventEnvelope) -> BusResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let frame = event.to_json()?;
        let mut conn = self.publisher().await?;
        let receivers: i64 = self.bounded(conn.publish(&self.channel, frame)).await?;

        debug!(
            channel = %self.channel,
            event_type = %event.event_type,
            receivers = receivers,
            "Event published"
        );
        Ok(())
    }

    async fn subscribe(&self) -> BusResult<Subscription> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let mut pubsub = self.bounded(self.client.get_async_pubsub()).await?;
        self.bounded(pubsub.subscribe(&self.channel)).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(channel = %self.channel, subscription = id, "Redis subscription opened");

        let mut closed_rx = self.closed_tx.subscribe();
        let bus_closed = async move {
            let _ = closed_rx.wait_for(|closed| *closed).await;
        };

        // The stream owns the pub/sub connection; dropping it unsubscribes.
        let feed = pubsub
            .into_on_message()
            .filter_map(move |msg| future::ready(decode_frame(id, &msg)))
            .take_until(bus_closed);

        Ok(Subscription::new(id, feed.boxed()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closed_tx.send_replace(true);
        self.publisher.lock().await.take();
        info!(channel = %self.channel, "Redis bus closed");
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}

/// Decode one pub/sub frame, skipping anything malformed.
fn decode_frame(subscription: u64, msg: &redis::Msg) -> Option<EventEnvelope> {
    let raw: String = match msg.get_payload() {
        Ok(raw) => raw,
        Err(e) => {
            debug!(subscription, error = %e, "Skipping non-text frame");
            return None;
        }
    };
    match EventEnvelope::from_json(&raw) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(subscription, error = %e, "Skipping undecodable frame");
            None
        }
    }
}
