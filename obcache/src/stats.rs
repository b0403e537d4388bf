//! Hit, miss, reset and in-flight counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::metrics;

/// Point-in-time copy of a memoizer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub hit: u64,
    pub miss: u64,
    pub reset: u64,
    pub pending: u64,
}

/// Counters shared by every operation of one memoizer.
#[derive(Debug, Default)]
pub struct StatsCollector {
    hit: AtomicU64,
    miss: AtomicU64,
    reset: AtomicU64,
    pending: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, operation: &str) {
        self.hit.fetch_add(1, Ordering::Relaxed);
        metrics::record_hit(operation);
    }

    pub fn record_miss(&self, operation: &str) {
        self.miss.fetch_add(1, Ordering::Relaxed);
        metrics::record_miss(operation);
    }

    pub fn record_reset(&self) {
        self.reset.fetch_add(1, Ordering::Relaxed);
        metrics::record_reset();
    }

    pub(crate) fn pending_opened(&self, operation: &str) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        metrics::record_pending(operation, 1.0);
    }

    // Paired with exactly one `pending_opened`, so the counter never wraps.
    pub(crate) fn pending_closed(&self, operation: &str) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        metrics::record_pending(operation, -1.0);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            hit: self.hit.load(Ordering::Relaxed),
            miss: self.miss.load(Ordering::Relaxed),
            reset: self.reset.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Acquire),
        }
    }
}
