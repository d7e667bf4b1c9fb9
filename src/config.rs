//! Startup configuration for the optional backends.
//!
//! Configuration is read once at process start. Each backend carries an
//! `enabled` flag (off means the backend is never contacted and every
//! dependent operation degrades to its no-op sentinel) and a `required`
//! flag (on means a failed connection attempt is fatal instead of degraded).

use std::time::Duration;

/// Default connection-attempt timeout for both backends.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default TTL applied to cache writes that do not specify one.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Cache backend configuration.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// When false the cache is never contacted (terminal `Disabled` state).
    pub enabled: bool,
    /// Connection URL, e.g. "redis://localhost:6379/0".
    pub url: String,
    /// When true a failed connection attempt is fatal at startup.
    pub required: bool,
    /// Budget for the one-shot connection attempt.
    pub connect_timeout: Duration,
    /// TTL in seconds for `set` calls that pass `None`.
    pub default_ttl_secs: u64,
    /// Prefix prepended to every key this process writes.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            url: "redis://localhost:6379/0".to_string(),
            required: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            default_ttl_secs: DEFAULT_TTL_SECS,
            key_prefix: "rk".to_string(),
        }
    }
}

impl CacheConfig {
    /// Disabled configuration, for processes that opt out of caching.
    pub fn disabled() -> Self {
        CacheConfig {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Message broker configuration.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// When false the broker is never contacted (terminal `Disabled` state).
    pub enabled: bool,
    /// Connection URL, e.g. "redis://localhost:6379/0".
    pub url: String,
    /// When true a failed connection attempt is fatal at startup.
    pub required: bool,
    /// Budget for the one-shot connection attempt.
    pub connect_timeout: Duration,
    /// Identifier stamped into logs for this process's broker traffic.
    pub client_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            enabled: true,
            url: "redis://localhost:6379/0".to_string(),
            required: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            client_id: "resilience-kit".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Disabled configuration, for processes that opt out of eventing.
    pub fn disabled() -> Self {
        BrokerConfig {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Top-level configuration, one per process.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub cache: CacheConfig,
    pub broker: BrokerConfig,
}

impl Config {
    /// Build configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `CACHE_ENABLED`, `CACHE_URL`, `CACHE_REQUIRED`, `CACHE_DEFAULT_TTL`,
    ///   `CACHE_KEY_PREFIX`, `CACHE_CONNECT_TIMEOUT_SECS`
    /// - `BROKER_ENABLED`, `BROKER_URL`, `BROKER_REQUIRED`,
    ///   `BROKER_CLIENT_ID`, `BROKER_CONNECT_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(v) = env_bool("CACHE_ENABLED") {
            config.cache.enabled = v;
        }
        if let Ok(url) = std::env::var("CACHE_URL") {
            config.cache.url = url;
        }
        if let Some(v) = env_bool("CACHE_REQUIRED") {
            config.cache.required = v;
        }
        if let Some(ttl) = env_u64("CACHE_DEFAULT_TTL") {
            config.cache.default_ttl_secs = ttl;
        }
        if let Ok(prefix) = std::env::var("CACHE_KEY_PREFIX") {
            config.cache.key_prefix = prefix;
        }
        if let Some(secs) = env_u64("CACHE_CONNECT_TIMEOUT_SECS") {
            config.cache.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(v) = env_bool("BROKER_ENABLED") {
            config.broker.enabled = v;
        }
        if let Ok(url) = std::env::var("BROKER_URL") {
            config.broker.url = url;
        }
        if let Some(v) = env_bool("BROKER_REQUIRED") {
            config.broker.required = v;
        }
        if let Ok(id) = std::env::var("BROKER_CLIENT_ID") {
            config.broker.client_id = id;
        }
        if let Some(secs) = env_u64("BROKER_CONNECT_TIMEOUT_SECS") {
            config.broker.connect_timeout = Duration::from_secs(secs);
        }

        config
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
