use std::sync::Arc;

use async_trait::async_trait;
use obcache_core::{CacheKey, Raw};

use crate::{DeleteStatus, StoreError};

pub type StoreResult<T> = Result<T, StoreError>;

/// Capability contract of a key-value store backing a memoizer.
///
/// Values are opaque serialized bytes. Implementations decide eviction and
/// time-to-live; the memoizer treats every store as eventually consistent and
/// never assumes a write is visible before its future resolves.
#[async_trait]
pub trait Store: Sync + Send {
    /// Reads a value. `Ok(None)` means the key is absent.
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Raw>>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &CacheKey, value: Raw) -> StoreResult<()>;

    /// Removes a single key.
    async fn expire(&self, key: &CacheKey) -> StoreResult<DeleteStatus>;

    /// Removes every key.
    ///
    /// Stores that cannot clear themselves must return
    /// [`StoreError::Unsupported`] instead of silently doing nothing.
    async fn reset(&self) -> StoreResult<()>;

    /// Connectivity and health signal.
    fn is_ready(&self) -> bool;

    /// Number of stored keys, when the store can tell.
    fn key_count(&self) -> Option<u64> {
        None
    }

    /// Returns the name of this store for logs and reports.
    fn name(&self) -> &str {
        "store"
    }
}

#[async_trait]
impl Store for &dyn Store {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Raw>> {
        (*self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Raw) -> StoreResult<()> {
        (*self).set(key, value).await
    }

    async fn expire(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        (*self).expire(key).await
    }

    async fn reset(&self) -> StoreResult<()> {
        (*self).reset().await
    }

    fn is_ready(&self) -> bool {
        (*self).is_ready()
    }

    fn key_count(&self) -> Option<u64> {
        (*self).key_count()
    }

    fn name(&self) -> &str {
        (*self).name()
    }
}

#[async_trait]
impl Store for Box<dyn Store> {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Raw>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Raw) -> StoreResult<()> {
        (**self).set(key, value).await
    }

    async fn expire(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        (**self).expire(key).await
    }

    async fn reset(&self) -> StoreResult<()> {
        (**self).reset().await
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn key_count(&self) -> Option<u64> {
        (**self).key_count()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl Store for Arc<dyn Store + Send + 'static> {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Raw>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Raw) -> StoreResult<()> {
        (**self).set(key, value).await
    }

    async fn expire(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        (**self).expire(key).await
    }

    async fn reset(&self) -> StoreResult<()> {
        (**self).reset().await
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn key_count(&self) -> Option<u64> {
        (**self).key_count()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
