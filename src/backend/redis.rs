//! Redis cache backend implementation.
//!
//! One multiplexed [`ConnectionManager`] per process — no pooling at this
//! layer. The manager reconnects transparently underneath; a command issued
//! while the link is down simply fails and is mapped to a degraded outcome
//! by the service layer.

use super::CacheBackend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// How many keys each SCAN page asks for during pattern deletes.
const SCAN_COUNT: u64 = 100;

/// Redis backend over a single shared multiplexed connection.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    /// Returns `Err` if the client cannot be built or the initial
    /// connection handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Connection(format!("invalid redis url: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Connection(format!("redis connect failed: {e}")))?;

        info!("✓ Redis cache backend connected: {}", url);
        Ok(RedisBackend { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| Error::backend("GET", key, e))?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();

        match ttl {
            Some(d) => {
                conn.set_ex::<_, _, ()>(key, value, d.as_secs())
                    .await
                    .map_err(|e| Error::backend("SETEX", key, e))?;
                debug!("✓ Redis SET {} (TTL: {:?})", key, d);
            }
            None => {
                conn.set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| Error::backend("SET", key, e))?;
                debug!("✓ Redis SET {}", key);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn
            .del(key)
            .await
            .map_err(|e| Error::backend("DEL", key, e))?;

        debug!("✓ Redis DEL {} ({} removed)", key, removed);
        Ok(removed > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        // Cursor-driven SCAN keeps this O(1) in server memory; KEYS would
        // block the server on large keyspaces.
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::backend("SCAN", pattern, e))?;

            if !keys.is_empty() {
                let removed: u64 = conn
                    .del(&keys)
                    .await
                    .map_err(|e| Error::backend("DEL", pattern, e))?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("✓ Redis pattern delete {} ({} removed)", pattern, deleted);
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| Error::backend("EXISTS", key, e))?;
        Ok(exists)
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
        // The multiplexed connection closes when the last clone drops.
        debug!("Redis cache backend released");
    }
}
