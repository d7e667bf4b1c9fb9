//! Event envelopes and the well-known event vocabulary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Topics the application publishes to.
pub mod topics {
    pub const USER_EVENTS: &str = "user-events";
    pub const NOTIFICATION_EVENTS: &str = "notification-events";
    pub const ANALYTICS_EVENTS: &str = "analytics-events";
}

/// Well-known event type strings.
pub mod types {
    pub const USER_REGISTERED: &str = "USER_REGISTERED";
    pub const USER_LOGIN: &str = "USER_LOGIN";
    pub const NOTIFICATION_CREATED: &str = "NOTIFICATION_CREATED";
    pub const ANALYTICS: &str = "ANALYTICS";
}

/// The wrapper carried across the broker, one per event.
///
/// Wire shape: `{"key", "type", "data", "timestamp"}` with a millisecond
/// Unix timestamp. Immutable once published.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Dedupe/partition key.
    pub key: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current time.
    ///
    /// The key falls back to `data.id`, then to the timestamp rendered as a
    /// string, so every envelope carries a usable routing key.
    pub fn new(event_type: impl Into<String>, data: Value, key: Option<String>) -> Self {
        let timestamp = now_millis();
        let key = key
            .or_else(|| data.get("id").and_then(|v| v.as_str()).map(String::from))
            .unwrap_or_else(|| timestamp.to_string());

        EventEnvelope {
            key,
            event_type: event_type.into(),
            data,
            timestamp,
        }
    }

    /// Serialize to the JSON wire format.
    pub fn to_bytes(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the JSON wire format.
    pub fn from_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
