use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use obcache_backend::{DeleteStatus, JsonFormat, Store};
use obcache_core::{CacheKey, KeyGenerator, SkipPositions};
use serde::{Serialize, de::DeserializeOwned};
use smol_str::{SmolStr, format_smolstr};
use tracing::{debug, trace, warn};

use crate::config::{CacheOptions, ConfigError};
use crate::error::CacheError;
use crate::operation::{BoxedOperation, CachedOperation};
use crate::reset::{ResetSchedule, ResetScheduler};
use crate::stats::{Stats, StatsCollector};

/// State shared by a memoizer and every operation it wrapped.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn Store + Send + 'static>,
    pub(crate) stats: Arc<StatsCollector>,
    pub(crate) queue_enabled: bool,
    pub(crate) keys: KeyGenerator,
    reset: Option<ResetScheduler>,
    format: JsonFormat,
    next_id: AtomicU64,
}

impl Shared {
    pub(crate) async fn maybe_reset(&self) {
        let Some(scheduler) = &self.reset else {
            return;
        };
        if !scheduler.poll(Utc::now()) {
            return;
        }
        debug!(store = self.store.name(), next = %scheduler.next_reset(), "Resetting store");
        self.stats.record_reset();
        if let Err(error) = self.store.reset().await {
            warn!(store = self.store.name(), %error, "Scheduled store reset failed");
        }
    }

    /// Reads and decodes a value. Store and decoding failures are logged and
    /// reported as absence.
    pub(crate) async fn lookup<V>(&self, key: &CacheKey) -> Option<V>
    where
        V: DeserializeOwned,
    {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(%key, store = self.store.name(), %error, "Store read failed");
                return None;
            }
        };
        trace!(%key, bytes = raw.len(), "Store read");
        match self.format.deserialize(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(%key, %error, "Stored value could not be decoded");
                None
            }
        }
    }

    /// Encodes and writes a value. Failures are logged and swallowed.
    pub(crate) async fn persist<V>(&self, key: &CacheKey, value: &V)
    where
        V: Serialize,
    {
        if let Err(error) = self.write(key, value).await {
            warn!(%key, store = self.store.name(), %error, "Store write failed");
        }
    }

    async fn write<V>(&self, key: &CacheKey, value: &V) -> Result<(), CacheError>
    where
        V: Serialize + ?Sized,
    {
        let raw = self.format.serialize(value)?;
        trace!(%key, bytes = raw.len(), "Store write");
        self.store.set(key, raw).await?;
        Ok(())
    }
}

/// Options applied to a single wrapped operation.
#[derive(Debug, Clone, Default)]
pub struct WrapOptions {
    name: Option<SmolStr>,
    skip: SkipPositions,
}

impl WrapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the name derived from the function's type.
    pub fn name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Argument positions left out of the key.
    pub fn skip(mut self, skip: impl Into<SkipPositions>) -> Self {
        self.skip = skip.into();
        self
    }
}

/// Memoizes asynchronous operations over a single [`Store`].
///
/// A memoizer owns the store handle, the statistics and the reset schedule.
/// Every operation wrapped by it shares those, while in-flight coalescing is
/// tracked per operation. Cloning a memoizer yields another handle to the
/// same state.
///
/// ```ignore
/// let memoizer = Memoizer::new(MokaStore::builder().max_entries(1000).build());
/// let load_user = memoizer.wrap(load_user);
///
/// let user = load_user.call((42,)).await?;
/// load_user.call_with((42,), |result| println!("{result:?}"));
/// ```
#[derive(Clone)]
pub struct Memoizer {
    shared: Arc<Shared>,
}

impl fmt::Debug for Memoizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("store", &self.shared.store.name())
            .field("queue_enabled", &self.shared.queue_enabled)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Memoizer {
    pub fn new<S>(store: S) -> Self
    where
        S: Store + 'static,
    {
        Self::builder(store).build()
    }

    pub fn builder<S>(store: S) -> MemoizerBuilder
    where
        S: Store + 'static,
    {
        MemoizerBuilder::new(Arc::new(store))
    }

    /// Builds the store described by `options` and a memoizer over it.
    pub fn from_options(options: CacheOptions) -> Result<Self, ConfigError> {
        let queue_enabled = options.queue_enabled;
        let reset = options.reset.clone();
        let store = options.into_store()?;

        let mut builder = MemoizerBuilder::new(store).queue_enabled(queue_enabled);
        if let Some(reset) = reset {
            builder = builder.reset(reset);
        }
        Ok(builder.build())
    }

    /// Wraps `operation`, naming it after its function type.
    pub fn wrap<F, Fut, Args, V, E>(&self, operation: F) -> CachedOperation<Args, V, E>
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        Args: 'static,
        V: 'static,
        E: 'static,
    {
        self.wrap_with(operation, WrapOptions::default())
    }

    pub fn wrap_with<F, Fut, Args, V, E>(
        &self,
        operation: F,
        options: WrapOptions,
    ) -> CachedOperation<Args, V, E>
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        Args: 'static,
        V: 'static,
        E: 'static,
    {
        let boxed: BoxedOperation<Args, V, E> =
            Arc::new(move |args: Args| operation(args).boxed());
        self.register(function_name::<F>(), options, boxed)
    }

    /// Wraps `operation` with `receiver` bound as its first parameter.
    ///
    /// The receiver takes no part in the key; only `Args` is fingerprinted.
    pub fn wrap_bound<R, F, Fut, Args, V, E>(
        &self,
        receiver: Arc<R>,
        operation: F,
        options: WrapOptions,
    ) -> CachedOperation<Args, V, E>
    where
        R: Send + Sync + 'static,
        F: Fn(Arc<R>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        Args: 'static,
        V: 'static,
        E: 'static,
    {
        let boxed: BoxedOperation<Args, V, E> =
            Arc::new(move |args: Args| operation(receiver.clone(), args).boxed());
        self.register(function_name::<F>(), options, boxed)
    }

    fn register<Args, V, E>(
        &self,
        derived: &str,
        options: WrapOptions,
        operation: BoxedOperation<Args, V, E>,
    ) -> CachedOperation<Args, V, E> {
        let name = options.name.as_deref().unwrap_or(derived);
        let counter = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format_smolstr!("{name}{counter}");
        debug!(operation = %id, skip = ?options.skip, "Wrapped operation");
        CachedOperation::new(self.shared.clone(), id, options.skip, operation)
    }

    /// Stores `value` as the result of `operation` called with `args`,
    /// without invoking it.
    pub async fn warmup<Args, V, E>(
        &self,
        operation: &CachedOperation<Args, V, E>,
        args: &Args,
        value: &V,
    ) -> Result<(), CacheError>
    where
        Args: Serialize,
        V: Serialize,
    {
        let key = self.owned_key(operation, args)?;
        debug!(%key, "Warming up");
        self.shared.write(&key, value).await
    }

    /// Removes the stored result of `operation` called with `args`.
    pub async fn invalidate<Args, V, E>(
        &self,
        operation: &CachedOperation<Args, V, E>,
        args: &Args,
    ) -> Result<DeleteStatus, CacheError>
    where
        Args: Serialize,
    {
        let key = self.owned_key(operation, args)?;
        debug!(%key, "Invalidating");
        Ok(self.shared.store.expire(&key).await?)
    }

    fn owned_key<Args, V, E>(
        &self,
        operation: &CachedOperation<Args, V, E>,
        args: &Args,
    ) -> Result<CacheKey, CacheError>
    where
        Args: Serialize,
    {
        if !operation.belongs_to(&self.shared) {
            return Err(CacheError::InvalidOperation {
                id: operation.id().to_string(),
            });
        }
        Ok(operation.key(args)?)
    }

    pub fn stats(&self) -> Stats {
        self.shared.stats.snapshot()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.store.is_ready()
    }

    pub fn store(&self) -> &Arc<dyn Store + Send + 'static> {
        &self.shared.store
    }

    pub fn queue_enabled(&self) -> bool {
        self.shared.queue_enabled
    }

    /// Next scheduled reset, when a schedule is configured.
    pub fn next_reset(&self) -> Option<DateTime<Utc>> {
        self.shared.reset.as_ref().map(ResetScheduler::next_reset)
    }
}

/// Builder for [`Memoizer`].
pub struct MemoizerBuilder {
    store: Arc<dyn Store + Send + 'static>,
    queue_enabled: bool,
    reset: Option<ResetSchedule>,
    keys: KeyGenerator,
}

impl MemoizerBuilder {
    pub fn new(store: Arc<dyn Store + Send + 'static>) -> Self {
        Self {
            store,
            queue_enabled: true,
            reset: None,
            keys: KeyGenerator::default(),
        }
    }

    /// Coalesce concurrent misses on the same key. Enabled by default.
    pub fn queue_enabled(mut self, enabled: bool) -> Self {
        self.queue_enabled = enabled;
        self
    }

    pub fn reset(mut self, schedule: ResetSchedule) -> Self {
        self.reset = Some(schedule);
        self
    }

    pub fn key_generator(mut self, keys: KeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn build(self) -> Memoizer {
        let reset = self
            .reset
            .as_ref()
            .map(|schedule| ResetScheduler::new(schedule, Utc::now()));
        Memoizer {
            shared: Arc::new(Shared {
                store: self.store,
                stats: Arc::new(StatsCollector::new()),
                queue_enabled: self.queue_enabled,
                keys: self.keys,
                reset,
                format: JsonFormat,
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

/// Last path segment of a function's type name, or `_` for closures.
fn function_name<F>() -> &'static str {
    let full = std::any::type_name::<F>();
    let path = full.split('<').next().unwrap_or(full);
    match path.rsplit("::").next() {
        Some(name) if !name.is_empty() && !name.starts_with('{') => name,
        _ => "_",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn load_user(_args: (u64,)) -> Result<u64, ()> {
        Ok(1)
    }

    fn name_of<F>(_: &F) -> &'static str {
        function_name::<F>()
    }

    #[test]
    fn function_items_are_named_after_their_path() {
        assert_eq!(name_of(&load_user), "load_user");
    }

    #[test]
    fn closures_are_anonymous() {
        let closure = |_: (u64,)| async { Ok::<u64, ()>(1) };
        assert_eq!(name_of(&closure), "_");
    }
}
