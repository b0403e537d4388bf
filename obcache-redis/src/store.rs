//! Redis store implementation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use obcache_backend::{DeleteStatus, Store, StoreError, StoreResult};
use obcache_core::{CacheKey, Raw};
use smol_str::SmolStr;
use redis::{Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::Error;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60);

/// Redis store based on the redis-rs crate.
///
/// Keys are namespaced as `obc:{id}:{key}` and values are written with
/// `SETEX`, so every entry expires after the configured max age. The
/// connection is established lazily on first use, or eagerly with
/// [`connect`](Self::connect).
pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    prefix: String,
    ttl: u64,
    twemproxy: bool,
    connect_timeout: Duration,
    ready: AtomicBool,
    key_count: AtomicU64,
    label: SmolStr,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("label", &self.label)
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .field("twemproxy", &self.twemproxy)
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Creates a builder for the store of instance `id`.
    ///
    /// The id namespaces keys and, outside twemproxy mode, selects the
    /// database unless one is set explicitly.
    #[must_use]
    pub fn builder(id: u32) -> RedisStoreBuilder {
        RedisStoreBuilder::new(id)
    }

    /// Establishes the connection and refreshes the key count.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut con = self.connection().await?.clone();
        debug!(store = %self.label, "Redis connected");
        if self.twemproxy {
            debug!("twemproxy compatibility mode, key statistics unavailable");
            return Ok(());
        }
        let size: u64 = redis::cmd("DBSIZE")
            .query_async(&mut con)
            .await
            .map_err(|error| self.failed(error))?;
        self.key_count.store(size, Ordering::Relaxed);
        Ok(())
    }

    /// Create lazy connection to redis via [`ConnectionManager`]
    pub async fn connection(&self) -> Result<&ConnectionManager, Error> {
        trace!("Get connection manager");
        let result = self
            .connection
            .get_or_try_init(|| async {
                trace!("Initialize new redis connection manager");
                match tokio::time::timeout(
                    self.connect_timeout,
                    self.client.get_connection_manager(),
                )
                .await
                {
                    Ok(Ok(manager)) => Ok(manager),
                    Ok(Err(error)) => Err(Error::Connect(error)),
                    Err(_) => Err(Error::ConnectTimeout(self.connect_timeout)),
                }
            })
            .await;
        match result {
            Ok(manager) => {
                self.ready.store(true, Ordering::Release);
                Ok(manager)
            }
            Err(error) => {
                debug!(store = %self.label, %error, "Redis connect error");
                self.ready.store(false, Ordering::Release);
                Err(error)
            }
        }
    }

    /// Full Redis key for `key`.
    pub fn prefixed(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, key.as_str())
    }

    /// Time-to-live applied to every write, in seconds.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    fn failed(&self, error: redis::RedisError) -> Error {
        debug!(store = %self.label, %error, "Redis error");
        self.ready.store(false, Ordering::Release);
        Error::Redis(error)
    }

    fn succeeded(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

/// Part of builder pattern implementation for RedisStore.
#[derive(Debug, Clone)]
pub struct RedisStoreBuilder {
    id: u32,
    url: Option<String>,
    host: String,
    port: u16,
    database: Option<i64>,
    twemproxy: bool,
    connect_timeout: Duration,
    max_age: Duration,
    label: SmolStr,
}

impl RedisStoreBuilder {
    fn new(id: u32) -> Self {
        Self {
            id,
            url: None,
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            database: None,
            twemproxy: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_age: DEFAULT_MAX_AGE,
            label: SmolStr::new_static("redis"),
        }
    }

    /// Connection URL, used verbatim. Overrides host, port and database.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Server host. Defaults to `localhost`; ignored when a URL is set.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Server port. Defaults to 6379; ignored when a URL is set.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Database to select. Defaults to the instance id outside twemproxy mode.
    pub fn database(mut self, database: i64) -> Self {
        self.database = Some(database);
        self
    }

    /// Proxy compatibility mode: no database selection, no key statistics and
    /// no store-wide reset.
    pub fn twemproxy(mut self, enabled: bool) -> Self {
        self.twemproxy = enabled;
        self
    }

    /// Upper bound on establishing the connection. Defaults to five seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Expiry of written entries, rounded down to whole seconds (at least one).
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set a custom label for this store.
    pub fn label(mut self, label: impl Into<SmolStr>) -> Self {
        self.label = label.into();
        self
    }

    /// Connection URL the store will use.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let database = self
            .database
            .or((!self.twemproxy).then_some(i64::from(self.id)));
        match database {
            Some(database) => format!("redis://{}:{}/{}", self.host, self.port, database),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }

    /// Create new instance of Redis store with passed settings.
    pub fn build(self) -> Result<RedisStore, Error> {
        Ok(RedisStore {
            client: Client::open(self.connection_url())?,
            connection: OnceCell::new(),
            prefix: format!("obc:{}:", self.id),
            ttl: self.max_age.as_secs().max(1),
            twemproxy: self.twemproxy,
            connect_timeout: self.connect_timeout,
            ready: AtomicBool::new(false),
            key_count: AtomicU64::new(0),
            label: self.label,
        })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Raw>> {
        let mut con = self.connection().await?.clone();
        let data: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.prefixed(key))
            .query_async(&mut con)
            .await
            .map_err(|error| self.failed(error))?;
        self.succeeded();
        Ok(data.map(Bytes::from))
    }

    async fn set(&self, key: &CacheKey, value: Raw) -> StoreResult<()> {
        let mut con = self.connection().await?.clone();
        let key = self.prefixed(key);
        debug!(%key, ttl = self.ttl, "setting key in redis");
        redis::cmd("SETEX")
            .arg(&key)
            .arg(self.ttl)
            .arg(value.as_ref())
            .query_async::<()>(&mut con)
            .await
            .map_err(|error| self.failed(error))?;
        self.succeeded();
        Ok(())
    }

    async fn expire(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        let mut con = self.connection().await?.clone();
        let existed: i64 = redis::cmd("EXPIRE")
            .arg(self.prefixed(key))
            .arg(0)
            .query_async(&mut con)
            .await
            .map_err(|error| self.failed(error))?;
        self.succeeded();
        if existed > 0 {
            Ok(DeleteStatus::Deleted(1))
        } else {
            Ok(DeleteStatus::Missing)
        }
    }

    async fn reset(&self) -> StoreResult<()> {
        if self.twemproxy {
            return Err(StoreError::Unsupported {
                operation: "reset",
                reason: "not possible in twemproxy compatibility mode",
            });
        }
        let mut con = self.connection().await?.clone();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut con)
            .await
            .map_err(|error| self.failed(error))?;
        self.succeeded();
        self.key_count.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn key_count(&self) -> Option<u64> {
        (!self.twemproxy).then(|| self.key_count.load(Ordering::Relaxed))
    }

    fn name(&self) -> &str {
        self.label.as_str()
    }
}
