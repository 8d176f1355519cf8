//! # Subscription
//!
//! The consuming side of the bus. A `Subscription` is an ordered feed of
//! every event published after it was created. Dropping it releases the
//! backend resources behind it (local queue registration or the dedicated
//! pub/sub connection), whichever way the consumer exits.

use crate::events::EventEnvelope;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::Stream;

/// Identifier of a subscription, unique per backend instance.
pub type SubscriptionId = u64;

/// A live feed of events.
///
/// Implements [`Stream`]; `None` means the backend went away (bus closed
/// or distributed connection lost) and no further events will arrive.
pub struct Subscription {
    id: SubscriptionId,
    inner: BoxStream<'static, EventEnvelope>,
}

impl Subscription {
    /// Wrap a backend-specific event stream.
    ///
    /// The stream must own whatever releases the registration on drop.
    pub(crate) fn new(id: SubscriptionId, inner: BoxStream<'static, EventEnvelope>) -> Self {
        Self { id, inner }
    }

    /// Subscription identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.inner.next().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Stream for Subscription {
    type Item = EventEnvelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
