//! Redis pub/sub broker implementation.
//!
//! Publishes over the shared multiplexed connection. Subscriptions each get
//! a dedicated connection because a connection in SUBSCRIBE mode cannot be
//! multiplexed with regular commands.

use super::{BrokerBackend, BrokerMessage, MessageStream};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;

/// Redis channel transport. Topics map 1:1 to Redis channels.
#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
    client: redis::Client,
}

impl RedisBroker {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    /// Returns `Err` if the client cannot be built or the initial
    /// connection handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Connection(format!("invalid redis url: {e}")))?;

        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| Error::Connection(format!("redis connect failed: {e}")))?;

        info!("✓ Redis broker connected: {}", url);
        Ok(RedisBroker { conn, client })
    }
}

#[async_trait]
impl BrokerBackend for RedisBroker {
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<()> {
        let mut conn = self.conn.clone();
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(topic)
            .arg(&message.payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::backend("PUBLISH", topic, e))?;

        debug!(
            "✓ Redis PUBLISH {} key={} ({} receivers)",
            topic, message.key, receivers
        );
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        // Dedicated connection: SUBSCRIBE takes the connection out of
        // request/response mode.
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Error::Connection(format!("redis pubsub connect failed: {e}")))?;

        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| Error::backend("SUBSCRIBE", topic, e))?;

        info!("✓ Redis SUBSCRIBE {}", topic);

        let stream = pubsub.into_on_message().map(|msg| {
            let payload: Vec<u8> = msg.get_payload().unwrap_or_default();
            // The routing key travels inside the envelope on this transport.
            let key = serde_json::from_slice::<serde_json::Value>(&payload)
                .ok()
                .and_then(|v| v.get("key").and_then(|k| k.as_str()).map(String::from))
                .unwrap_or_default();
            BrokerMessage { key, payload }
        });

        Ok(stream.boxed())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Connection(format!("redis ping failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        debug!("Redis broker released");
    }
}
