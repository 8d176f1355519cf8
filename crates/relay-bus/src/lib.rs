//! # Relay Bus - Event Fan-out for Live Subscribers
//!
//! Producers publish small [`EventEnvelope`]s; every subscriber that is live
//! at publish time receives them, in publish order per subscriber.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐  subscribe()  ┌──────────────┐
//! │  Publisher   │ ────────────▶ │   EventBus   │ ────────────▶ │ Subscription │ × N
//! └──────────────┘               │ ┌──────────┐ │               └──────────────┘
//!                                │ │ LocalBus │ │  (no REDIS_URL)
//!                                │ ├──────────┤ │
//!                                │ │ RedisBus │ │  (REDIS_URL set)
//!                                │ └──────────┘ │
//!                                └──────────────┘
//! ```
//!
//! ## Contract
//!
//! - `publish` is fire-and-forget: it returns once the backend accepted the
//!   event, never waits for subscribers, and "no subscribers" is not an error.
//! - A `Subscription` sees every event published after it was opened.
//!   Dropping it (normal exit, error, or task cancellation) releases its
//!   queue or pub/sub connection.
//! - Delivery is at-most-once. There is no ordering across publishing
//!   processes.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod backend;
pub mod bus;
pub mod distributed;
pub mod error;
pub mod events;
pub mod local;
pub mod subscriber;

// Re-export main types
pub use backend::{BackendKind, BusBackend};
pub use bus::{BusConfig, EventBus};
pub use distributed::RedisBus;
pub use error::{BusError, BusResult};
pub use events::{EventEnvelope, CHANNEL_FIELD, SYSTEM_EVENT_TYPE};
pub use local::LocalBus;
pub use subscriber::{Subscription, SubscriptionId};

/// Default Redis pub/sub channel.
pub const DEFAULT_BUS_CHANNEL: &str = "mb:events";

/// Events buffered per local subscriber before deliveries to it are dropped.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1000;

/// Events retained in the recent-activity ring.
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channel() {
        assert_eq!(DEFAULT_BUS_CHANNEL, "mb:events");
    }

    #[test]
    fn test_default_buffers() {
        assert_eq!(DEFAULT_SUBSCRIBER_BUFFER, 1000);
        assert_eq!(BusConfig::default().recent_capacity, DEFAULT_RECENT_CAPACITY);
    }
}
