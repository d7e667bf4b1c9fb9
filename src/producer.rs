//! Event producer: at-most-once publishing over the optional broker.

use crate::broker::BrokerMessage;
use crate::connection::BrokerConnection;
use crate::event::{topics, types, EventEnvelope};
use serde_json::{json, Value};
use std::sync::Arc;

/// Publishes event envelopes to the broker.
///
/// If the broker is disabled, unreachable, or the send fails, the event is
/// logged and dropped — never queued or retried here. Transient network
/// recovery lives beneath this layer, inside the connection manager.
#[derive(Clone)]
pub struct EventProducer {
    conn: Arc<BrokerConnection>,
}

impl EventProducer {
    pub fn new(conn: Arc<BrokerConnection>) -> Self {
        EventProducer { conn }
    }

    /// Publish one event to `topic`. Returns whether it was handed to the
    /// broker; `false` means the event was dropped.
    pub async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        data: Value,
        key: Option<String>,
    ) -> bool {
        let Some(broker) = self.conn.handle().await else {
            warn!("✗ Broker unavailable, dropping {} event for {}", event_type, topic);
            return false;
        };

        let envelope = EventEnvelope::new(event_type, data, key);
        let payload = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("✗ Failed to serialize {} event: {}", event_type, e);
                return false;
            }
        };

        let message = BrokerMessage {
            key: envelope.key.clone(),
            payload,
        };

        match broker.publish(topic, message).await {
            Ok(()) => {
                debug!("✓ Published {} to {} (key: {})", event_type, topic, envelope.key);
                true
            }
            Err(e) => {
                warn!("✗ Publish of {} to {} failed, event dropped: {}", event_type, topic, e);
                false
            }
        }
    }

    /// A user completed registration.
    pub async fn publish_registration(&self, user_id: &str, email: &str) -> bool {
        self.publish(
            topics::USER_EVENTS,
            types::USER_REGISTERED,
            json!({ "id": user_id, "email": email }),
            Some(user_id.to_string()),
        )
        .await
    }

    /// A user logged in.
    pub async fn publish_login(&self, user_id: &str) -> bool {
        self.publish(
            topics::USER_EVENTS,
            types::USER_LOGIN,
            json!({ "id": user_id }),
            Some(user_id.to_string()),
        )
        .await
    }

    /// A notification should be delivered to a user.
    pub async fn publish_notification(&self, user_id: &str, title: &str, body: &str) -> bool {
        self.publish(
            topics::NOTIFICATION_EVENTS,
            types::NOTIFICATION_CREATED,
            json!({ "id": user_id, "title": title, "body": body }),
            Some(user_id.to_string()),
        )
        .await
    }

    /// Generic analytics signal.
    pub async fn publish_analytics(&self, event_name: &str, data: Value) -> bool {
        self.publish(
            topics::ANALYTICS_EVENTS,
            types::ANALYTICS,
            json!({ "event": event_name, "payload": data }),
            None,
        )
        .await
    }
}
