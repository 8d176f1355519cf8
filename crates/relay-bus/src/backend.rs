//! # Bus Backend
//!
//! The interface both bus implementations satisfy.

use crate::error::BusResult;
use crate::events::EventEnvelope;
use crate::subscriber::Subscription;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Which concrete backend an [`crate::EventBus`] selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local fan-out.
    Local,
    /// Redis pub/sub.
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Redis => f.write_str("redis"),
        }
    }
}

/// Publish/subscribe contract shared by the local and distributed buses.
///
/// Delivery is at-most-once and best-effort. Order is preserved per
/// subscriber for events handed over by the same publishing connection.
#[async_trait]
pub trait BusBackend: Send + Sync {
    /// Hand an event to the backend.
    ///
    /// Returns once the backend has accepted the event, not once it has been
    /// delivered. Having no subscribers is not an error. Must never block on
    /// a slow subscriber.
    async fn publish(&self, event: EventEnvelope) -> BusResult<()>;

    /// Open a new feed of every event published from now on.
    async fn subscribe(&self) -> BusResult<Subscription>;

    /// Release backend connections. Idempotent.
    async fn close(&self);

    /// Backend discriminator for health reporting.
    fn kind(&self) -> BackendKind;

    /// Live subscriber count, where the backend can know it.
    fn subscriber_count(&self) -> Option<usize> {
        None
    }
}
