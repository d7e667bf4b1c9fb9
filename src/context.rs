//! Composition root: one context object owning both connection managers.
//!
//! There is no ambient/global state in this crate. The process builds one
//! `AppContext` at startup and passes (clones of) its components to
//! whatever needs them — handlers get the [`HttpCache`], mutation paths get
//! the [`EventProducer`], background wiring gets the [`EventConsumer`].

use crate::config::Config;
use crate::connection::{BrokerConnection, CacheConnection, ConnectionState};
use crate::consumer::EventConsumer;
use crate::error::Result;
use crate::http::HttpCache;
use crate::producer::EventProducer;
use crate::service::CacheService;
use std::sync::Arc;

/// Everything the resilience layer hands the rest of the application.
#[derive(Clone)]
pub struct AppContext {
    cache_conn: Arc<CacheConnection>,
    broker_conn: Arc<BrokerConnection>,
    pub cache: CacheService,
    pub http_cache: HttpCache,
    pub producer: EventProducer,
    pub consumer: EventConsumer,
}

impl AppContext {
    /// Build and eagerly initialize both backends.
    ///
    /// # Errors
    /// Returns `Err` only when a backend marked `required` cannot be
    /// reached; every other failure degrades and the context comes up
    /// anyway.
    pub async fn initialize(config: Config) -> Result<Self> {
        let ttl = config.cache.default_ttl_secs;
        let cache_conn = Arc::new(CacheConnection::new(config.cache));
        let broker_conn = Arc::new(BrokerConnection::new(config.broker));

        let cache_state = cache_conn.initialize().await?;
        let broker_state = broker_conn.initialize().await?;
        info!(
            "Resilience layer up (cache: {:?}, broker: {:?})",
            cache_state, broker_state
        );

        Ok(Self::wire(cache_conn, broker_conn, ttl))
    }

    /// Assemble a context around pre-built connections.
    ///
    /// Lets tests and in-process deployments inject in-memory backends.
    pub fn from_connections(
        cache_conn: Arc<CacheConnection>,
        broker_conn: Arc<BrokerConnection>,
    ) -> Self {
        let ttl = cache_conn.config().default_ttl_secs;
        Self::wire(cache_conn, broker_conn, ttl)
    }

    fn wire(
        cache_conn: Arc<CacheConnection>,
        broker_conn: Arc<BrokerConnection>,
        default_ttl_secs: u64,
    ) -> Self {
        let cache = CacheService::new(Arc::clone(&cache_conn));
        let http_cache = HttpCache::new(cache.clone(), default_ttl_secs);
        let producer = EventProducer::new(Arc::clone(&broker_conn));
        let consumer = EventConsumer::new(Arc::clone(&broker_conn));

        AppContext {
            cache_conn,
            broker_conn,
            cache,
            http_cache,
            producer,
            consumer,
        }
    }

    pub fn cache_state(&self) -> ConnectionState {
        self.cache_conn.state()
    }

    pub fn broker_state(&self) -> ConnectionState {
        self.broker_conn.state()
    }

    /// Graceful shutdown: drain in-flight HTTP cache writes, stop consumer
    /// loops, close both connections. All best-effort; never errors.
    pub async fn shutdown(&self) {
        self.http_cache.drain().await;
        self.consumer.shutdown();
        self.cache_conn.teardown().await;
        self.broker_conn.teardown().await;
        info!("Resilience layer shut down");
    }
}
