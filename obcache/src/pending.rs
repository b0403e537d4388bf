//! In-flight registry used to coalesce concurrent misses on the same key.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::{DashMap, mapref::entry::Entry};
use obcache_core::CacheKey;
use smol_str::SmolStr;
use tracing::warn;

use crate::stats::StatsCollector;

/// Result of joining the registry for a key.
pub enum Joined<'a, W> {
    /// No invocation was in flight. The caller must run the operation and
    /// hand its waiter back.
    Leader(InFlight<'a, W>, W),
    /// The waiter was queued behind the running invocation.
    Follower,
}

/// Open entries per key, each holding the waiters queued in arrival order.
pub struct PendingRegistry<W> {
    operation: SmolStr,
    // Waiters are only touched through exclusive map access; the mutex is
    // there so the registry is `Sync` for any `Send` waiter.
    entries: DashMap<CacheKey, Mutex<Vec<W>>>,
    stats: Arc<StatsCollector>,
}

impl<W> PendingRegistry<W> {
    pub fn new(operation: impl Into<SmolStr>, stats: Arc<StatsCollector>) -> Self {
        Self {
            operation: operation.into(),
            entries: DashMap::new(),
            stats,
        }
    }

    /// Atomically checks for an open entry on `key` and either creates it or
    /// queues `waiter` on it.
    pub fn join(&self, key: &CacheKey, waiter: W) -> Joined<'_, W> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                entry
                    .get_mut()
                    .get_mut()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(waiter);
                Joined::Follower
            }
            Entry::Vacant(entry) => {
                entry.insert(Mutex::new(Vec::new()));
                self.stats.pending_opened(&self.operation);
                Joined::Leader(
                    InFlight {
                        registry: self,
                        key: Some(key.clone()),
                    },
                    waiter,
                )
            }
        }
    }

    fn complete(&self, key: &CacheKey) -> Vec<W> {
        let waiters = self
            .entries
            .remove(key)
            .map(|(_, waiters)| waiters.into_inner().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or_default();
        self.stats.pending_closed(&self.operation);
        waiters
    }

    /// Number of open entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }
}

/// Ownership of an open entry.
///
/// Completing it removes the entry and yields the queued waiters. Dropping it
/// without completing (the leader panicked or its task was aborted) still
/// closes the entry so later calls are not queued forever; the waiters are
/// dropped undelivered.
pub struct InFlight<'a, W> {
    registry: &'a PendingRegistry<W>,
    key: Option<CacheKey>,
}

impl<W> InFlight<'_, W> {
    pub fn complete(mut self) -> Vec<W> {
        match self.key.take() {
            Some(key) => self.registry.complete(&key),
            None => Vec::new(),
        }
    }
}

impl<W> Drop for InFlight<'_, W> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let abandoned = self.registry.complete(&key);
            warn!(
                key = %key,
                waiters = abandoned.len(),
                "In-flight invocation abandoned before completion"
            );
        }
    }
}
