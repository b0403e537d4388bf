//! Named memoizers for inspection.
//!
//! Registering a memoizer keeps a handle to it so its statistics and store
//! state can be reported or logged from one place.

use std::sync::LazyLock;

use dashmap::DashMap;
use serde::Serialize;
use smol_str::SmolStr;
use tracing::info;

use crate::memoizer::Memoizer;
use crate::stats::Stats;

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Process-wide registry.
pub fn global() -> &'static Registry {
    &GLOBAL
}

/// State of one registered memoizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub name: String,
    pub store: String,
    pub ready: bool,
    pub key_count: Option<u64>,
    pub stats: Stats,
}

#[derive(Debug, Default)]
pub struct Registry {
    caches: DashMap<SmolStr, Memoizer>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `memoizer` under `name`, replacing any previous entry, and
    /// returns a handle to it.
    pub fn register(&self, name: impl Into<SmolStr>, memoizer: &Memoizer) -> Memoizer {
        self.caches.insert(name.into(), memoizer.clone());
        memoizer.clone()
    }

    pub fn unregister(&self, name: &str) -> Option<Memoizer> {
        self.caches.remove(name).map(|(_, memoizer)| memoizer)
    }

    pub fn get(&self, name: &str) -> Option<Memoizer> {
        self.caches.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// One report per registered memoizer, ordered by name.
    pub fn report(&self) -> Vec<CacheReport> {
        let mut reports: Vec<CacheReport> = self
            .caches
            .iter()
            .map(|entry| {
                let memoizer = entry.value();
                let store = memoizer.store();
                CacheReport {
                    name: entry.key().to_string(),
                    store: store.name().to_string(),
                    ready: store.is_ready(),
                    key_count: store.key_count(),
                    stats: memoizer.stats(),
                }
            })
            .collect();
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }

    /// Emits one event per registered memoizer.
    pub fn log(&self) {
        for report in self.report() {
            info!(
                cache = %report.name,
                store = %report.store,
                ready = report.ready,
                keys = ?report.key_count,
                hit = report.stats.hit,
                miss = report.stats.miss,
                reset = report.stats.reset,
                pending = report.stats.pending,
                "Cache report"
            );
        }
    }
}
