//! Error types for the resilience layer.
//!
//! The governing rule (see [`crate::service`]) is that a cache or broker
//! failure never reaches the caller on the primary path. Errors defined here
//! therefore circulate *inside* the crate: the service layer swallows them,
//! logs them, and maps them to each operation's no-op sentinel. The only
//! errors that escape are `Config`/`Connection` failures for a backend
//! marked required, and a `Producer` failure in `wrap` (the producer is the
//! authoritative source, not optional infrastructure).

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by backends, connections, and the service layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure establishing a backend connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// An operation failed on an otherwise live connection.
    #[error("backend error: {0}")]
    Backend(String),

    /// A cached payload or event envelope could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A connection attempt exceeded its timeout.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The value producer passed to `wrap` failed.
    #[error("producer error: {0}")]
    Producer(String),
}

impl Error {
    /// Shorthand for a backend operation error with context.
    pub(crate) fn backend(op: &str, key: &str, err: impl std::fmt::Display) -> Self {
        Error::Backend(format!("{op} failed for key {key}: {err}"))
    }
}
