//! # Event Envelope
//!
//! The single record type that flows through the bus.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type used for bus-generated announcements (channel opened, etc.).
pub const SYSTEM_EVENT_TYPE: &str = "system";

/// Payload key carrying the logical channel an event belongs to.
pub const CHANNEL_FIELD: &str = "channel";

/// An event as published by a producer and seen by every live subscriber.
///
/// Immutable once published. Has no identity beyond its arrival order
/// within a single subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type, e.g. `message` or `system`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Arbitrary JSON object payload.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl EventEnvelope {
    /// Create an envelope with an empty payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: Map::new(),
        }
    }

    /// Create an envelope from an existing payload map.
    pub fn with_payload(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Builder-style insert of a single payload field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Tag the envelope with the channel it was published to.
    #[must_use]
    pub fn on_channel(self, channel: &str) -> Self {
        self.field(CHANNEL_FIELD, channel)
    }

    /// Channel recorded in the payload, if any.
    pub fn channel(&self) -> Option<&str> {
        self.payload.get(CHANNEL_FIELD).and_then(Value::as_str)
    }

    /// Whether this event should reach a subscriber filtering on `channel`.
    ///
    /// `None` matches everything.
    pub fn matches_channel(&self, channel: Option<&str>) -> bool {
        match channel {
            None => true,
            Some(wanted) => self.channel() == Some(wanted),
        }
    }

    /// Compact JSON text used on the distributed wire and in SSE chunks.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a frame received from the distributed backend.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_uses_type_key() {
        let event = EventEnvelope::new("message").field("text", "hi");
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "message", "payload": {"text": "hi"}}));
    }

    #[test]
    fn test_missing_payload_defaults_to_empty() {
        let event = EventEnvelope::from_json(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(event.event_type, "ping");
        assert!(event.payload.is_empty());
    }

    #[test]
    fn test_rejects_non_object_payload() {
        assert!(EventEnvelope::from_json(r#"{"type":"x","payload":[1,2]}"#).is_err());
        assert!(EventEnvelope::from_json("not json").is_err());
    }

    #[test]
    fn test_channel_matching() {
        let event = EventEnvelope::new("message").on_channel("alpha");
        assert_eq!(event.channel(), Some("alpha"));
        assert!(event.matches_channel(None));
        assert!(event.matches_channel(Some("alpha")));
        assert!(!event.matches_channel(Some("beta")));

        let untagged = EventEnvelope::new("message");
        assert!(!untagged.matches_channel(Some("alpha")));
    }
}
