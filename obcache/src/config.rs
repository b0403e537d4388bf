//! Declarative memoizer configuration.
//!
//! ```yaml
//! max: 500
//! max_age: 5m
//! reset:
//!   interval: 1h
//! ```
//!
//! Durations use humantime notation. Keys written in camel case
//! (`maxSize`, `maxAge`, `queueEnabled`, `firstReset`, `connectTimeout`) are
//! accepted as aliases.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use obcache_backend::Store;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reset::ResetSchedule;

#[cfg(feature = "moka")]
pub use obcache_moka::EvictionListener;

#[cfg(feature = "moka")]
const DEFAULT_MAX_ENTRIES: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`max` and `max_size` cannot both be set")]
    ConflictingCapacity,

    #[error("the redis store requires an integer `id`")]
    MissingId,

    #[error("store not available: {0}")]
    StoreNotAvailable(String),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] obcache_redis::Error),
}

/// Options for a memoizer and the store it builds.
#[derive(Clone, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Instance id. Required for the redis store.
    #[serde(default)]
    pub id: Option<u32>,
    /// Maximum number of entries of the in-process store.
    #[serde(default)]
    pub max: Option<u64>,
    /// Approximate byte budget of the in-process store.
    #[serde(default, alias = "maxSize")]
    pub max_size: Option<u64>,
    #[serde(default, alias = "maxAge", with = "humantime_serde")]
    pub max_age: Option<Duration>,
    #[serde(default = "default_queue_enabled", alias = "queueEnabled")]
    pub queue_enabled: bool,
    #[serde(default)]
    pub reset: Option<ResetSchedule>,
    /// Use a redis store instead of the in-process one.
    #[serde(default)]
    pub redis: Option<RedisOptions>,
    #[serde(default)]
    pub label: Option<String>,
    #[cfg(feature = "moka")]
    #[serde(skip)]
    on_evict: Option<EvictionListener>,
}

fn default_queue_enabled() -> bool {
    true
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            id: None,
            max: None,
            max_size: None,
            max_age: None,
            queue_enabled: default_queue_enabled(),
            reset: None,
            redis: None,
            label: None,
            #[cfg(feature = "moka")]
            on_evict: None,
        }
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CacheOptions");
        s.field("id", &self.id)
            .field("max", &self.max)
            .field("max_size", &self.max_size)
            .field("max_age", &self.max_age)
            .field("queue_enabled", &self.queue_enabled)
            .field("reset", &self.reset)
            .field("redis", &self.redis)
            .field("label", &self.label);
        #[cfg(feature = "moka")]
        s.field("on_evict", &self.on_evict.is_some());
        s.finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisOptions {
    /// Connection URL. Takes precedence over host, port and database.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<i64>,
    #[serde(default)]
    pub twemproxy: bool,
    #[serde(default, alias = "connectTimeout", with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
}

impl CacheOptions {
    /// Callback for entries leaving the in-process store.
    #[cfg(feature = "moka")]
    pub fn on_evict<F>(mut self, listener: F) -> Self
    where
        F: Fn(&obcache_core::CacheKey, &obcache_core::Raw, obcache_moka::RemovalCause)
            + Send
            + Sync
            + 'static,
    {
        self.on_evict = Some(Arc::new(listener));
        self
    }

    /// Builds the configured store.
    ///
    /// A redis store starts connecting in the background when called inside
    /// a Tokio runtime, and otherwise connects on first use.
    pub fn into_store(self) -> Result<Arc<dyn Store + Send + 'static>, ConfigError> {
        if self.max.is_some() && self.max_size.is_some() {
            return Err(ConfigError::ConflictingCapacity);
        }
        match self.redis.clone() {
            Some(redis) => self.into_redis_store(redis),
            None => self.into_moka_store(),
        }
    }

    #[cfg(feature = "moka")]
    fn into_moka_store(self) -> Result<Arc<dyn Store + Send + 'static>, ConfigError> {
        use obcache_moka::MokaStore;

        let mut builder = MokaStore::builder();
        if let Some(max_age) = self.max_age {
            builder = builder.max_age(max_age);
        }
        if let Some(label) = self.label {
            builder = builder.label(label);
        }
        if let Some(listener) = self.on_evict {
            builder = builder.eviction_listener(listener);
        }

        let store = match self.max_size {
            Some(bytes) => builder.max_bytes(bytes).build(),
            None => builder
                .max_entries(self.max.unwrap_or(DEFAULT_MAX_ENTRIES))
                .build(),
        };
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "moka"))]
    fn into_moka_store(self) -> Result<Arc<dyn Store + Send + 'static>, ConfigError> {
        Err(ConfigError::StoreNotAvailable("moka".to_string()))
    }

    #[cfg(feature = "redis")]
    fn into_redis_store(
        self,
        redis: RedisOptions,
    ) -> Result<Arc<dyn Store + Send + 'static>, ConfigError> {
        use obcache_redis::RedisStore;

        let id = self.id.ok_or(ConfigError::MissingId)?;
        let mut builder = RedisStore::builder(id).twemproxy(redis.twemproxy);
        if let Some(url) = redis.url {
            builder = builder.url(url);
        }
        if let Some(host) = redis.host {
            builder = builder.host(host);
        }
        if let Some(port) = redis.port {
            builder = builder.port(port);
        }
        if let Some(database) = redis.database {
            builder = builder.database(database);
        }
        if let Some(timeout) = redis.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(max_age) = self.max_age {
            builder = builder.max_age(max_age);
        }
        if let Some(label) = self.label {
            builder = builder.label(label);
        }

        let store = Arc::new(builder.build()?);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let eager = store.clone();
            handle.spawn(async move {
                if let Err(error) = eager.connect().await {
                    tracing::warn!(%error, "Redis connect failed");
                }
            });
        }
        Ok(store)
    }

    #[cfg(not(feature = "redis"))]
    fn into_redis_store(
        self,
        _redis: RedisOptions,
    ) -> Result<Arc<dyn Store + Send + 'static>, ConfigError> {
        Err(ConfigError::StoreNotAvailable("redis".to_string()))
    }
}
