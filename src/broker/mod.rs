//! Message broker abstraction and implementations.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

#[cfg(feature = "inmemory")]
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "inmemory")]
pub use memory::MemoryBroker;
#[cfg(feature = "redis")]
pub use redis::RedisBroker;

/// One message as seen on the wire: a routing/dedupe key plus an opaque
/// payload (JSON text, see [`crate::event::EventEnvelope`]).
#[derive(Clone, Debug)]
pub struct BrokerMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Stream of messages delivered to one subscription.
///
/// The stream ends when the underlying transport closes; the consumer loop
/// treats that as subscription shutdown, not as an error to escalate.
pub type MessageStream = BoxStream<'static, BrokerMessage>;

/// Raw publish/subscribe transport.
///
/// Object-safe for the same reason as [`crate::backend::CacheBackend`]: the
/// broker connection manager picks an implementation at runtime and hands
/// out `Arc<dyn BrokerBackend>`.
#[async_trait]
pub trait BrokerBackend: Send + Sync {
    /// Publish one message to `topic`. Delivery is at-most-once from the
    /// caller's perspective; an error here means the event is dropped.
    async fn publish(&self, topic: &str, message: BrokerMessage) -> Result<()>;

    /// Open a subscription to `topic`.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream>;

    /// Round-trip health probe.
    async fn ping(&self) -> Result<()>;

    /// Best-effort close. Default is a no-op.
    async fn close(&self) {}
}
