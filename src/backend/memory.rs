//! In-memory cache backend.
//!
//! Used by tests and by single-process deployments that want response
//! caching without operating a Redis. Entries carry an absolute expiry
//! instant and are reaped lazily on read.

use super::CacheBackend;
use crate::error::Result;
use crate::key::glob_match;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Process-local cache backed by a concurrent map.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    entries: Arc<DashMap<String, Entry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.data.clone())),
            Some(entry) => {
                drop(entry);
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            data: value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let matches: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired() && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut deleted = 0u64;
        for key in matches {
            if self.entries.remove(&key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", b"value".to_vec(), None)
            .await
            .expect("Failed to set");

        let got = backend.get("k").await.expect("Failed to get");
        assert_eq!(got, Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.get("nope").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", b"v".to_vec(), Some(Duration::from_millis(50)))
            .await
            .expect("Failed to set");

        assert!(backend.exists("k").await.expect("Failed to check"));

        // Expiry is wall-clock based, so this test sleeps for real.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.get("k").await.expect("Failed to get"), None);
        assert!(!backend.exists("k").await.expect("Failed to check"));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", b"v".to_vec(), None)
            .await
            .expect("Failed to set");

        assert!(backend.delete("k").await.expect("Failed to delete"));
        assert!(!backend.delete("k").await.expect("Failed to delete"));
    }

    #[tokio::test]
    async fn test_delete_pattern_precision() {
        let backend = InMemoryBackend::new();
        for key in ["ns:1", "ns:2", "other:1"] {
            backend
                .set(key, b"v".to_vec(), None)
                .await
                .expect("Failed to set");
        }

        let deleted = backend
            .delete_pattern("ns:*")
            .await
            .expect("Failed to delete pattern");
        assert_eq!(deleted, 2);

        // Non-matching keys are untouched.
        assert!(backend.exists("other:1").await.expect("Failed to check"));
        assert!(!backend.exists("ns:1").await.expect("Failed to check"));
    }

    #[tokio::test]
    async fn test_delete_pattern_no_match() {
        let backend = InMemoryBackend::new();
        let deleted = backend
            .delete_pattern("ns:*")
            .await
            .expect("Failed to delete pattern");
        assert_eq!(deleted, 0);
    }
}
