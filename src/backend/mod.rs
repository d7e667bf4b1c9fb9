//! Cache backend abstraction and implementations.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "inmemory")]
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "inmemory")]
pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis::RedisBackend;

/// Raw byte-level cache backend.
///
/// Implementations own the live connection to the store. The trait is
/// object-safe so the connection manager can hand out `Arc<dyn CacheBackend>`
/// picked at runtime from configuration. Errors returned here are swallowed
/// one layer up, in [`crate::service::CacheService`] — backends report
/// honestly and let the service decide how to degrade.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the raw bytes stored under `key`, `None` on miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring after `ttl` if given.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Delete one key. Returns whether a key was actually removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key matching a glob-style pattern, returning the count.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    /// Check whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Round-trip health probe.
    async fn ping(&self) -> Result<()>;

    /// Best-effort close. Default is a no-op for connectionless backends.
    async fn close(&self) {}
}
