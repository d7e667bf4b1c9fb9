//! Cache-aside service over an optional backend.
//!
//! Every operation here is async and none of them error toward the caller:
//! a disabled backend, a dead connection, a failed command, and a corrupt
//! payload all collapse into the operation's no-op sentinel (`None`,
//! `false`, `0`). The only observable failure signature of this layer is
//! the absence of the speedup it would otherwise provide — callers always
//! fall through to their authoritative source.
//!
//! `wrap` is the exception that proves the rule: the *producer* passed to it
//! is the authoritative source, so producer errors propagate.

use crate::connection::CacheConnection;
use crate::error::{Error, Result};
use crate::key::KeyBuilder;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Internal lookup outcome.
///
/// The public API collapses everything but `Hit` into a miss, but keeping
/// the distinction lets tests and logs tell "not cached" apart from "cache
/// broken" without changing degraded behavior.
#[derive(Debug)]
pub(crate) enum Lookup<T> {
    Hit(T),
    Miss,
    /// Backend disabled or failed; no call was attempted.
    Unavailable,
    /// The backend errored, or the payload would not deserialize.
    Error,
}

impl<T> Lookup<T> {
    pub(crate) fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit(v) => Some(v),
            _ => None,
        }
    }
}

/// Cache-aside primitives over the shared cache connection.
///
/// Cheap to clone; clones share the connection and the in-flight table.
#[derive(Clone)]
pub struct CacheService {
    conn: Arc<CacheConnection>,
    keys: Arc<KeyBuilder>,
    /// Per-key locks serializing concurrent cold misses in `wrap`.
    in_flight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CacheService {
    pub fn new(conn: Arc<CacheConnection>) -> Self {
        let keys = KeyBuilder::new(conn.config().key_prefix.clone());
        CacheService {
            conn,
            keys: Arc::new(keys),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.conn.config().default_ttl_secs)
    }

    /// Fetch and deserialize the value under `key`.
    ///
    /// Returns `None` on miss, on a disabled/failed connection, and on any
    /// I/O or deserialization error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lookup(key).await.into_option()
    }

    pub(crate) async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let Some(backend) = self.conn.handle().await else {
            return Lookup::Unavailable;
        };

        let full_key = self.keys.key(key);
        match backend.get(&full_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Lookup::Hit(value),
                Err(e) => {
                    // Corrupt payload reads as a miss.
                    warn!("✗ Cache payload for {} is corrupt: {}", full_key, e);
                    Lookup::Error
                }
            },
            Ok(None) => Lookup::Miss,
            Err(e) => {
                warn!("✗ Cache GET {} failed: {}", full_key, e);
                Lookup::Error
            }
        }
    }

    /// Serialize and store `value` under `key`.
    ///
    /// `ttl` is in seconds; `None` applies the configured default. Returns
    /// whether the write happened.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<u64>) -> bool {
        let Some(backend) = self.conn.handle().await else {
            return false;
        };

        let full_key = self.keys.key(key);
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("✗ Cache SET {} serialization failed: {}", full_key, e);
                return false;
            }
        };

        let ttl = ttl.map(Duration::from_secs).unwrap_or_else(|| self.default_ttl());
        match backend.set(&full_key, bytes, Some(ttl)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("✗ Cache SET {} failed: {}", full_key, e);
                false
            }
        }
    }

    /// Delete one key. Returns whether a key was removed.
    pub async fn del(&self, key: &str) -> bool {
        let Some(backend) = self.conn.handle().await else {
            return false;
        };

        let full_key = self.keys.key(key);
        match backend.delete(&full_key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("✗ Cache DEL {} failed: {}", full_key, e);
                false
            }
        }
    }

    /// Delete every key matching a glob pattern, returning the count
    /// removed (`0` when nothing matches or the backend is unavailable).
    pub async fn del_pattern(&self, pattern: &str) -> u64 {
        let Some(backend) = self.conn.handle().await else {
            return 0;
        };

        let full_pattern = self.keys.pattern(pattern);
        match backend.delete_pattern(&full_pattern).await {
            Ok(count) => {
                if count > 0 {
                    info!("✓ Cache invalidated {} keys matching {}", count, full_pattern);
                }
                count
            }
            Err(e) => {
                warn!("✗ Cache pattern delete {} failed: {}", full_pattern, e);
                0
            }
        }
    }

    /// Existence check. `false` when unavailable.
    pub async fn exists(&self, key: &str) -> bool {
        let Some(backend) = self.conn.handle().await else {
            return false;
        };

        let full_key = self.keys.key(key);
        match backend.exists(&full_key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("✗ Cache EXISTS {} failed: {}", full_key, e);
                false
            }
        }
    }

    /// Cache-aside composition: return the cached value under `key`, or
    /// invoke `producer`, store its result, and return it.
    ///
    /// Concurrent cold misses on one key serialize on a per-key lock and
    /// re-check the cache after acquiring it, so `producer` runs once per
    /// cold key rather than once per caller.
    ///
    /// # Errors
    /// Only `producer`'s own failure propagates (as `Error::Producer`);
    /// cache unavailability just means the producer runs every time.
    pub async fn wrap<T, F, Fut, E>(&self, key: &str, ttl: Option<u64>, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        // Fast path: no lock on a warm key.
        if let Some(value) = self.get(key).await {
            debug!("✓ wrap hit for {}", key);
            return Ok(value);
        }

        let lock = Arc::clone(
            self.in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = lock.lock().await;

        // A concurrent caller may have populated the key while this one
        // waited on the lock.
        if let Some(value) = self.get(key).await {
            debug!("✓ wrap hit for {} (populated in flight)", key);
            return Ok(value);
        }

        debug!("wrap miss for {}, invoking producer", key);
        let outcome = match producer().await {
            Ok(value) => {
                // Store before dropping the per-key entry: a caller arriving
                // mid-write must find the entry and wait, not start its own
                // producer against a still-empty cache.
                self.set(key, &value, ttl).await;
                Ok(value)
            }
            Err(e) => Err(Error::Producer(e.to_string())),
        };

        self.in_flight.remove(key);
        outcome
    }
}
