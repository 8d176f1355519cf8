//! Announces newly opened channels on the bus.

use async_trait::async_trait;
use relay_bus::{EventBus, EventEnvelope, SYSTEM_EVENT_TYPE};
use relay_ratelimit::{ChannelLimits, ChannelOpenedNotifier};
use std::sync::Arc;
use tracing::warn;

/// Publishes a `system` event when a channel is first used.
pub struct BusChannelNotifier {
    bus: Arc<EventBus>,
}

impl BusChannelNotifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

/// The announcement for `channel`.
pub fn channel_opened_event(channel: &str, limits: &ChannelLimits) -> EventEnvelope {
    EventEnvelope::new(SYSTEM_EVENT_TYPE)
        .field("message", format!("New channel `{channel}` opened"))
        .on_channel(channel)
        .field("capacity", limits.capacity)
        .field("refill_per_sec", limits.refill_per_sec)
        .field("timestamp", chrono::Utc::now().to_rfc3339())
}

#[async_trait]
impl ChannelOpenedNotifier for BusChannelNotifier {
    async fn channel_opened(&self, channel: &str, limits: &ChannelLimits) {
        if let Err(e) = self.bus.publish(channel_opened_event(channel, limits)).await {
            warn!(channel, error = %e, "Failed to announce new channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_event_shape() {
        let event = channel_opened_event("news", &ChannelLimits::default());
        assert_eq!(event.event_type, "system");
        assert_eq!(event.channel(), Some("news"));
        assert_eq!(event.payload["message"], "New channel `news` opened");
        assert_eq!(event.payload["capacity"], 5);
        assert!(event.payload["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_announces_on_bus() {
        let bus = Arc::new(EventBus::local());
        let mut sub = bus.subscribe().await.unwrap();

        let notifier = BusChannelNotifier::new(bus.clone());
        notifier
            .channel_opened("news", &ChannelLimits::default())
            .await;

        let event = timeout(Duration::from_millis(200), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, SYSTEM_EVENT_TYPE);
    }

    #[tokio::test]
    async fn test_closed_bus_is_not_fatal() {
        let bus = Arc::new(EventBus::local());
        bus.close().await;
        BusChannelNotifier::new(bus)
            .channel_opened("news", &ChannelLimits::default())
            .await;
    }
}
