//! Moka store implementation.

use async_trait::async_trait;
use moka::future::Cache;
use obcache_backend::{DeleteStatus, Store, StoreResult};
use obcache_core::{CacheKey, Raw};
use smol_str::SmolStr;
use tracing::trace;

use crate::builder::{MokaStoreBuilder, NoCapacity};
use crate::metrics;

/// In-process store powered by Moka.
///
/// Clones share the same underlying cache.
///
/// Expiration is best-effort: Moka applies evictions on its maintenance
/// cycle, so counts may lag until [`Cache::run_pending_tasks`] runs.
#[derive(Clone)]
pub struct MokaStore {
    cache: Cache<CacheKey, Raw>,
    label: SmolStr,
}

impl std::fmt::Debug for MokaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStore")
            .field("label", &self.label)
            .field("cache", &self.cache)
            .finish()
    }
}

impl MokaStore {
    /// Creates a new builder. Capacity must be set before building.
    pub fn builder() -> MokaStoreBuilder<NoCapacity> {
        MokaStoreBuilder::new()
    }

    pub(crate) fn from_parts(cache: Cache<CacheKey, Raw>, label: SmolStr) -> Self {
        Self { cache, label }
    }

    /// The underlying Moka cache.
    pub fn cache(&self) -> &Cache<CacheKey, Raw> {
        &self.cache
    }

    /// Label identifying this store.
    pub fn label(&self) -> &SmolStr {
        &self.label
    }

    fn record_entries(&self) {
        metrics::record_entries(&self.label, self.cache.entry_count());
    }
}

#[async_trait]
impl Store for MokaStore {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Raw>> {
        let value = self.cache.get(key).await;
        trace!(store = %self.label, %key, found = value.is_some(), "get");
        Ok(value)
    }

    async fn set(&self, key: &CacheKey, value: Raw) -> StoreResult<()> {
        trace!(store = %self.label, %key, bytes = value.len(), "set");
        self.cache.insert(key.clone(), value).await;
        self.record_entries();
        Ok(())
    }

    async fn expire(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        trace!(store = %self.label, %key, "expire");
        let removed = self.cache.remove(key).await;
        self.record_entries();
        Ok(match removed {
            Some(_) => DeleteStatus::Deleted(1),
            None => DeleteStatus::Missing,
        })
    }

    async fn reset(&self) -> StoreResult<()> {
        trace!(store = %self.label, "reset");
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        self.record_entries();
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn key_count(&self) -> Option<u64> {
        Some(self.cache.entry_count())
    }

    fn name(&self) -> &str {
        self.label.as_str()
    }
}
