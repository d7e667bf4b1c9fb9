//! # resilience-kit
//!
//! A degradation-first resilience layer over *optional* infrastructure:
//! a key-value cache and a publish/subscribe message broker.
//!
//! ## Principles
//!
//! - **Never crash the caller:** a disabled, unreachable, or failing
//!   backend degrades every operation to its no-op sentinel (`None`,
//!   `false`, `0`) instead of surfacing an error
//! - **One connection per backend per process:** lazy, at-most-once
//!   initialization with a timeout; `Failed` is terminal, no retry loops
//! - **Cache-aside:** callers keep their authoritative source; the cache
//!   only ever adds speed, never correctness
//! - **At-most-once eventing:** an undeliverable event is logged and
//!   dropped, never queued locally
//!
//! ## Quick Start
//!
//! ```ignore
//! use resilience_kit::{AppContext, Config, HttpCache};
//!
//! let ctx = AppContext::initialize(Config::from_env()).await?;
//!
//! // Cache-aside read
//! let course: Course = ctx.cache
//!     .wrap("course:42", Some(300), || db.fetch_course("42"))
//!     .await?;
//!
//! // HTTP response caching
//! let app = Router::new()
//!     .route("/api/courses", get(list_courses))
//!     .layer(axum::middleware::from_fn_with_state(
//!         ctx.http_cache.clone(),
//!         HttpCache::handle,
//!     ));
//!
//! // Eventing
//! ctx.producer.publish_registration("42", "ann@example.com").await;
//! ctx.consumer.on("USER_REGISTERED", |envelope| Box::pin(async move {
//!     // send the welcome email
//!     Ok(())
//! }));
//! ctx.consumer.subscribe("user-events", None).await;
//!
//! // On shutdown
//! ctx.shutdown().await;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod broker;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod context;
pub mod error;
pub mod event;
pub mod http;
pub mod key;
pub mod producer;
pub mod service;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use broker::{BrokerBackend, BrokerMessage};
pub use config::{BrokerConfig, CacheConfig, Config};
pub use connection::{BrokerConnection, CacheConnection, ConnectionState};
pub use consumer::EventConsumer;
pub use context::AppContext;
pub use error::{Error, Result};
pub use event::EventEnvelope;
pub use http::{CallerIdentity, HttpCache};
pub use producer::EventProducer;
pub use service::CacheService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
