//! Builder for configuring [`MokaStore`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use moka::future::{Cache, CacheBuilder};
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use obcache_core::{CacheKey, Raw};
use smol_str::SmolStr;

use crate::store::MokaStore;

/// Callback invoked when an entry leaves the store.
///
/// Called for capacity evictions, expirations, explicit removals and
/// replacements; the [`RemovalCause`] tells them apart.
pub type EvictionListener = Arc<dyn Fn(&CacheKey, &Raw, RemovalCause) + Send + Sync + 'static>;

/// Marker type: capacity has not been configured yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapacity;

/// Marker type: the store holds at most `n` entries.
#[derive(Debug, Clone, Copy)]
pub struct EntryCapacity(pub(crate) u64);

/// Marker type: the store holds approximately `n` bytes of keys and values.
#[derive(Debug, Clone, Copy)]
pub struct ByteCapacity(pub(crate) u64);

/// Builder for creating and configuring a [`MokaStore`].
///
/// Capacity is set with exactly one of [`max_entries`](Self::max_entries) or
/// [`max_bytes`](Self::max_bytes); `build()` only exists afterwards.
///
/// ```
/// use std::time::Duration;
/// use obcache_moka::MokaStore;
///
/// let store = MokaStore::builder()
///     .label("users")
///     .max_bytes(8 * 1024 * 1024)
///     .max_age(Duration::from_secs(60))
///     .build();
/// ```
pub struct MokaStoreBuilder<Cap> {
    capacity: Cap,
    label: SmolStr,
    max_age: Option<Duration>,
    eviction_policy: Option<EvictionPolicy>,
    listener: Option<EvictionListener>,
}

impl<Cap: fmt::Debug> fmt::Debug for MokaStoreBuilder<Cap> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MokaStoreBuilder")
            .field("capacity", &self.capacity)
            .field("label", &self.label)
            .field("max_age", &self.max_age)
            .field("listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl MokaStoreBuilder<NoCapacity> {
    /// Creates a new builder with no capacity configured.
    pub fn new() -> Self {
        Self {
            capacity: NoCapacity,
            label: SmolStr::new_static("moka"),
            max_age: None,
            eviction_policy: None,
            listener: None,
        }
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(self, capacity: u64) -> MokaStoreBuilder<EntryCapacity> {
        self.with_capacity(EntryCapacity(capacity))
    }

    /// Sets the approximate memory budget in bytes.
    ///
    /// An entry weighs the size of its key plus the length of its encoded
    /// value.
    pub fn max_bytes(self, bytes: u64) -> MokaStoreBuilder<ByteCapacity> {
        self.with_capacity(ByteCapacity(bytes))
    }

    fn with_capacity<Cap>(self, capacity: Cap) -> MokaStoreBuilder<Cap> {
        MokaStoreBuilder {
            capacity,
            label: self.label,
            max_age: self.max_age,
            eviction_policy: self.eviction_policy,
            listener: self.listener,
        }
    }
}

impl Default for MokaStoreBuilder<NoCapacity> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Cap> MokaStoreBuilder<Cap> {
    /// Sets the label used in logs, metrics and reports.
    ///
    /// Defaults to `"moka"`.
    pub fn label(mut self, label: impl Into<SmolStr>) -> Self {
        self.label = label.into();
        self
    }

    /// Entries expire this long after they were written.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Overrides the eviction policy. Defaults to least-recently-used.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Registers a callback for entries leaving the store.
    pub fn on_evict<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CacheKey, &Raw, RemovalCause) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Registers an already shared eviction callback.
    pub fn eviction_listener(mut self, listener: EvictionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    fn configure(
        &mut self,
        builder: CacheBuilder<CacheKey, Raw, Cache<CacheKey, Raw>>,
    ) -> CacheBuilder<CacheKey, Raw, Cache<CacheKey, Raw>> {
        let policy = self.eviction_policy.take().unwrap_or_else(EvictionPolicy::lru);
        let mut builder = builder.eviction_policy(policy);
        if let Some(max_age) = self.max_age {
            builder = builder.time_to_live(max_age);
        }
        if let Some(listener) = self.listener.take() {
            builder = builder.eviction_listener(move |key: Arc<CacheKey>, value: Raw, cause| {
                listener(&key, &value, cause)
            });
        }
        builder
    }
}

impl MokaStoreBuilder<EntryCapacity> {
    /// Builds the store with entry-count capacity.
    pub fn build(mut self) -> MokaStore {
        let builder = CacheBuilder::new(self.capacity.0);
        let cache = self.configure(builder).build();
        MokaStore::from_parts(cache, self.label)
    }
}

impl MokaStoreBuilder<ByteCapacity> {
    /// Builds the store with byte capacity.
    pub fn build(mut self) -> MokaStore {
        let builder = CacheBuilder::new(self.capacity.0).weigher(byte_weigher);
        let cache = self.configure(builder).build();
        MokaStore::from_parts(cache, self.label)
    }
}

fn byte_weigher(key: &CacheKey, value: &Raw) -> u32 {
    (key.memory_size() + value.len()).min(u32::MAX as usize) as u32
}
