//! Event consumer: handler registry and sequential dispatch loops.

use crate::connection::BrokerConnection;
use crate::error::Result;
use crate::event::EventEnvelope;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Asynchronous event handler. Exactly one per event type.
pub type EventHandler =
    Arc<dyn Fn(EventEnvelope) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Subscribes to topics and dispatches envelopes to registered handlers.
///
/// Dispatch is strictly sequential within one subscription: a message is
/// fully handled before the next is read. Separate topics run separate,
/// uncoordinated loops. A failing handler is logged and its message counts
/// as processed — there is no redelivery and no dead-letter queue.
#[derive(Clone)]
pub struct EventConsumer {
    conn: Arc<BrokerConnection>,
    handlers: Arc<DashMap<String, EventHandler>>,
    loops: Arc<DashMap<String, JoinHandle<()>>>,
}

impl EventConsumer {
    pub fn new(conn: Arc<BrokerConnection>) -> Self {
        EventConsumer {
            conn,
            handlers: Arc::new(DashMap::new()),
            loops: Arc::new(DashMap::new()),
        }
    }

    /// Register the handler for `event_type`, replacing any prior one.
    /// Last registration wins; there is no fan-out.
    pub fn on<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(EventEnvelope) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        if self.handlers.insert(event_type.to_string(), Arc::new(handler)).is_some() {
            debug!("Handler for {} replaced", event_type);
        }
    }

    /// Subscribe to `topic` and start its dispatch loop.
    ///
    /// Connects lazily. On a disabled or failed broker this logs and
    /// returns `false` with no loop started. A duplicate subscription to a
    /// topic already being consumed also returns `false`.
    pub async fn subscribe(&self, topic: &str, group_id: Option<&str>) -> bool {
        if self.loops.contains_key(topic) {
            warn!("Already subscribed to {}", topic);
            return false;
        }

        let Some(broker) = self.conn.handle().await else {
            warn!("✗ Broker unavailable, not subscribing to {}", topic);
            return false;
        };

        let mut stream = match broker.subscribe(topic).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("✗ Subscribe to {} failed: {}", topic, e);
                return false;
            }
        };

        let group = group_id.unwrap_or(&self.conn.config().client_id).to_string();
        info!("✓ Consuming {} (group: {})", topic, group);

        let handlers = Arc::clone(&self.handlers);
        let topic_name = topic.to_string();
        let handle = tokio::spawn(async move {
            // One message at a time: the handler is awaited before the
            // next read.
            while let Some(message) = stream.next().await {
                let envelope = match EventEnvelope::from_bytes(&message.payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("✗ Undecodable message on {}, dropped: {}", topic_name, e);
                        continue;
                    }
                };

                let Some(handler) = handlers.get(&envelope.event_type).map(|h| Arc::clone(h.value()))
                else {
                    debug!(
                        "No handler for {} on {}, message dropped",
                        envelope.event_type, topic_name
                    );
                    continue;
                };

                let event_type = envelope.event_type.clone();
                let key = envelope.key.clone();
                if let Err(e) = handler(envelope).await {
                    // The message still counts as processed.
                    error!(
                        "✗ Handler for {} failed on {} (key: {}): {}",
                        event_type, topic_name, key, e
                    );
                } else {
                    debug!("✓ Handled {} on {} (key: {})", event_type, topic_name, key);
                }
            }
            info!("Subscription to {} ended", topic_name);
        });

        // Re-check at insertion: a concurrent subscribe may have won the
        // slot while this one was connecting.
        match self.loops.entry(topic.to_string()) {
            Entry::Occupied(_) => {
                warn!("Already subscribed to {}", topic);
                handle.abort();
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Stop every dispatch loop, best-effort.
    pub fn shutdown(&self) {
        for entry in self.loops.iter() {
            entry.value().abort();
        }
        self.loops.clear();
        debug!("Consumer loops stopped");
    }
}
