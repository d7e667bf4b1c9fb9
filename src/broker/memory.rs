//! In-process broker for tests and single-process deployments.
//!
//! Each topic is a tokio broadcast channel. Publishing to a topic with no
//! subscribers drops the message, which matches the at-most-once contract.

use super::{BrokerBackend, BrokerMessage, MessageStream};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const TOPIC_CAPACITY: usize = 256;

/// Broadcast-channel broker, one channel per topic.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<DashMap<String, broadcast::Sender<BrokerMessage>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<BrokerMessage> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl BrokerBackend for MemoryBroker {
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<()> {
        // A send error only means nobody is subscribed right now.
        let receivers = self.sender(topic).send(message).unwrap_or(0);
        debug!("✓ Memory broker publish to {} ({} receivers)", topic, receivers);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let rx = self.sender(topic).subscribe();
        debug!("✓ Memory broker subscribed to {}", topic);

        // Lagged receivers skip ahead; dropped messages are logged and lost.
        let stream = BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!("Memory broker subscriber lagged: {}", e);
                    None
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
