//! # SSE Stream Adapter
//!
//! Bridges one client connection to one bus subscription. A pump task pulls
//! events from the subscription and writes `data: <json>\n\n` chunks into a
//! small per-connection channel that backs the response body. The pump
//! stops when the client goes away (the body, and with it the channel
//! receiver, is dropped), when the relay shuts down, or when the bus closes.
//! The subscription is owned by the pump, so every exit path releases it.
//!
//! While idle, a comment line is sent every heartbeat interval so proxies
//! do not time the connection out.

use crate::domain::config::StreamConfig;
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use relay_bus::{EventEnvelope, Subscription};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// First chunk of every stream.
pub const HELLO_CHUNK: &str = "event: hello\ndata: {\"hello\":true}\n\n";

/// Idle keep-alive; a comment line, ignored by SSE clients.
pub const KEEP_ALIVE_CHUNK: &str = ": keep-alive\n\n";

type Chunk = Result<Bytes, Infallible>;

/// Encode one event as an SSE `data:` frame.
pub fn encode_event(event: &EventEnvelope) -> Option<Bytes> {
    match event.to_json() {
        Ok(json) => Some(Bytes::from(format!("data: {json}\n\n"))),
        Err(e) => {
            warn!(event_type = %event.event_type, error = %e, "Event not encodable, skipped");
            None
        }
    }
}

/// Spawns pump tasks and builds streaming responses.
#[derive(Clone)]
pub struct StreamAdapter {
    heartbeat: Duration,
    chunk_buffer: usize,
    shutdown: watch::Receiver<bool>,
    active: Arc<AtomicUsize>,
}

impl StreamAdapter {
    pub fn new(config: &StreamConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            heartbeat: config.heartbeat,
            chunk_buffer: config.chunk_buffer.max(1),
            shutdown,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open streams.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Stream `subscription` to the client, optionally only events of `channel`.
    pub fn respond(&self, subscription: Subscription, channel: Option<String>) -> Response {
        let (tx, rx) = mpsc::channel::<Chunk>(self.chunk_buffer);

        let pump = Pump {
            subscription,
            channel,
            tx,
            heartbeat: self.heartbeat,
            shutdown: self.shutdown.clone(),
            _guard: ActiveGuard::enter(Arc::clone(&self.active)),
        };
        tokio::spawn(pump.run());

        sse_response(Body::from_stream(ReceiverStream::new(rx)))
    }
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Counts a stream as open for as long as it lives.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

struct Pump {
    subscription: Subscription,
    channel: Option<String>,
    tx: mpsc::Sender<Chunk>,
    heartbeat: Duration,
    shutdown: watch::Receiver<bool>,
    _guard: ActiveGuard,
}

impl Pump {
    async fn run(mut self) {
        let id = self.subscription.id();
        debug!(subscription = id, channel = ?self.channel, "Stream opened");

        let stopping = *self.shutdown.borrow();
        if stopping || !self.send(Bytes::from_static(HELLO_CHUNK.as_bytes())).await {
            return;
        }

        let mut ticker = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                _ = self.tx.closed() => break "client disconnected",
                _ = self.shutdown.changed() => break "shutdown",
                _ = ticker.tick() => {
                    if !self.send(Bytes::from_static(KEEP_ALIVE_CHUNK.as_bytes())).await {
                        break "client disconnected";
                    }
                }
                next = self.subscription.next() => {
                    let Some(event) = next else {
                        break "bus closed";
                    };
                    if !event.matches_channel(self.channel.as_deref()) {
                        continue;
                    }
                    let Some(chunk) = encode_event(&event) else {
                        continue;
                    };
                    if !self.send(chunk).await {
                        break "client disconnected";
                    }
                    ticker.reset();
                }
            }
        };

        debug!(subscription = id, reason, "Stream closed");
    }

    async fn send(&mut self, chunk: Bytes) -> bool {
        self.tx.send(Ok(chunk)).await.is_ok()
    }
}
