//! Backend connection lifecycle: lazy, at-most-once initialization with
//! timeout and graceful degradation.
//!
//! Each optional backend gets one manager per process. The first caller to
//! need the backend performs the connection attempt; concurrent callers
//! await the same attempt rather than racing their own (the initialization
//! is guarded by a `OnceCell`, not a plain flag). The recorded outcome is
//! final: `Failed` is terminal for the process lifetime, with no automatic
//! retry even if the backend later comes back.

use crate::backend::CacheBackend;
use crate::broker::BrokerBackend;
use crate::config::{BrokerConfig, CacheConfig};
use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Lifecycle of one backend connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Configured off. Terminal; the backend is never contacted.
    Disabled,
    /// No caller has needed the backend yet.
    NotAttempted,
    /// A connection attempt is in flight.
    Attempting,
    /// The live handle is available.
    Connected,
    /// The attempt failed. Terminal for the process lifetime.
    Failed,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Disabled,
            1 => ConnectionState::NotAttempted,
            2 => ConnectionState::Attempting,
            3 => ConnectionState::Connected,
            _ => ConnectionState::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disabled => 0,
            ConnectionState::NotAttempted => 1,
            ConnectionState::Attempting => 2,
            ConnectionState::Connected => 3,
            ConnectionState::Failed => 4,
        }
    }
}

/// Single-flight connection guard shared by both backends.
///
/// Holds the outcome of the one permitted attempt: `Some(handle)` when
/// connected, `None` when disabled or failed.
struct Guard<T: ?Sized> {
    cell: OnceCell<Option<Arc<T>>>,
    state: AtomicU8,
}

impl<T: ?Sized> Guard<T> {
    fn new(enabled: bool) -> Self {
        let initial = if enabled {
            ConnectionState::NotAttempted
        } else {
            ConnectionState::Disabled
        };
        Guard {
            cell: OnceCell::new(),
            state: AtomicU8::new(initial.as_u8()),
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Run the at-most-once attempt, racing `connect` against `timeout`.
    ///
    /// Never returns an error: failure is recorded as `None` and reported
    /// through [`Guard::state`]. Idempotent — later calls observe the
    /// recorded outcome.
    async fn attempt<F, Fut>(&self, name: &str, timeout: Duration, connect: F) -> Option<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>>>,
    {
        if self.state() == ConnectionState::Disabled {
            return None;
        }

        let outcome = self
            .cell
            .get_or_init(|| async {
                self.set_state(ConnectionState::Attempting);
                info!("Connecting to {} (timeout: {:?})", name, timeout);

                match tokio::time::timeout(timeout, connect()).await {
                    Ok(Ok(handle)) => {
                        self.set_state(ConnectionState::Connected);
                        info!("✓ {} connected", name);
                        Some(handle)
                    }
                    Ok(Err(e)) => {
                        // A partially opened handle is dropped here, before
                        // the failure is recorded.
                        self.set_state(ConnectionState::Failed);
                        warn!("✗ {} connection failed, continuing degraded: {}", name, e);
                        None
                    }
                    Err(_) => {
                        self.set_state(ConnectionState::Failed);
                        let e = Error::Timeout(timeout);
                        warn!("✗ {} connection failed, continuing degraded: {}", name, e);
                        None
                    }
                }
            })
            .await;

        outcome.clone()
    }
}

/// Connection manager for the cache backend.
pub struct CacheConnection {
    config: CacheConfig,
    guard: Guard<dyn CacheBackend>,
}

impl CacheConnection {
    pub fn new(config: CacheConfig) -> Self {
        let guard = Guard::new(config.enabled);
        CacheConnection { config, guard }
    }

    /// Wrap an already-built backend, recording it as connected.
    ///
    /// Used by tests and by deployments that run on the in-memory backend.
    pub fn with_backend(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        let conn = CacheConnection::new(config);
        let _ = conn.guard.cell.set(Some(backend));
        conn.guard.set_state(ConnectionState::Connected);
        conn
    }

    pub fn state(&self) -> ConnectionState {
        self.guard.state()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Eagerly attempt the connection, honoring the `required` flag.
    ///
    /// # Errors
    /// Returns `Err` only when the backend is required and the attempt
    /// failed; otherwise the process continues in degraded mode.
    pub async fn initialize(&self) -> Result<ConnectionState> {
        self.handle().await;
        let state = self.state();

        if state == ConnectionState::Failed && self.config.required {
            return Err(Error::Connection(format!(
                "cache backend is required but unreachable at {}",
                self.config.url
            )));
        }
        Ok(state)
    }

    /// Live handle, connecting lazily on first use.
    ///
    /// Returns `None` when disabled or failed — never an error.
    pub async fn handle(&self) -> Option<Arc<dyn CacheBackend>> {
        let config = &self.config;
        self.guard
            .attempt("cache backend", config.connect_timeout, || async {
                Self::connect(config).await
            })
            .await
    }

    #[cfg(feature = "redis")]
    async fn connect(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>> {
        let backend = crate::backend::RedisBackend::connect(&config.url).await?;
        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "redis"))]
    async fn connect(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>> {
        Err(Error::Config(format!(
            "no cache backend compiled in for {}",
            config.url
        )))
    }

    /// Best-effort close, swallowing any error.
    pub async fn teardown(&self) {
        if let Some(Some(backend)) = self.guard.cell.get() {
            backend.close().await;
        }
        debug!("Cache connection torn down");
    }
}

/// Connection manager for the message broker.
pub struct BrokerConnection {
    config: BrokerConfig,
    guard: Guard<dyn BrokerBackend>,
}

impl BrokerConnection {
    pub fn new(config: BrokerConfig) -> Self {
        let guard = Guard::new(config.enabled);
        BrokerConnection { config, guard }
    }

    /// Wrap an already-built broker, recording it as connected.
    pub fn with_backend(config: BrokerConfig, backend: Arc<dyn BrokerBackend>) -> Self {
        let conn = BrokerConnection::new(config);
        let _ = conn.guard.cell.set(Some(backend));
        conn.guard.set_state(ConnectionState::Connected);
        conn
    }

    pub fn state(&self) -> ConnectionState {
        self.guard.state()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Eagerly attempt the connection, honoring the `required` flag.
    ///
    /// # Errors
    /// Returns `Err` only when the broker is required and the attempt
    /// failed.
    pub async fn initialize(&self) -> Result<ConnectionState> {
        self.handle().await;
        let state = self.state();

        if state == ConnectionState::Failed && self.config.required {
            return Err(Error::Connection(format!(
                "broker is required but unreachable at {}",
                self.config.url
            )));
        }
        Ok(state)
    }

    /// Live handle, connecting lazily on first use.
    pub async fn handle(&self) -> Option<Arc<dyn BrokerBackend>> {
        let config = &self.config;
        self.guard
            .attempt("broker", config.connect_timeout, || async {
                Self::connect(config).await
            })
            .await
    }

    #[cfg(feature = "redis")]
    async fn connect(config: &BrokerConfig) -> Result<Arc<dyn BrokerBackend>> {
        let broker = crate::broker::RedisBroker::connect(&config.url).await?;
        Ok(Arc::new(broker))
    }

    #[cfg(not(feature = "redis"))]
    async fn connect(config: &BrokerConfig) -> Result<Arc<dyn BrokerBackend>> {
        Err(Error::Config(format!(
            "no broker backend compiled in for {}",
            config.url
        )))
    }

    /// Best-effort close, swallowing any error.
    pub async fn teardown(&self) {
        if let Some(Some(broker)) = self.guard.cell.get() {
            broker.close().await;
        }
        debug!("Broker connection torn down");
    }
}
