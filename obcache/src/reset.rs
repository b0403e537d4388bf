//! Lazy, traffic-driven store clearing.
//!
//! There is no background timer. Every memoized call polls the scheduler and
//! the first caller to observe an elapsed boundary performs the clear.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// When to clear the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSchedule {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// First clear. Defaults to one interval after the memoizer is built.
    #[serde(default, alias = "firstReset")]
    pub first_reset: Option<DateTime<Utc>>,
}

impl ResetSchedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            first_reset: None,
        }
    }

    pub fn starting_at(mut self, first_reset: DateTime<Utc>) -> Self {
        self.first_reset = Some(first_reset);
        self
    }
}

#[derive(Debug)]
pub struct ResetScheduler {
    interval_ms: i64,
    next_ms: AtomicI64,
}

impl ResetScheduler {
    pub fn new(schedule: &ResetSchedule, now: DateTime<Utc>) -> Self {
        let interval_ms = i64::try_from(schedule.interval.as_millis())
            .unwrap_or(i64::MAX)
            .max(1);
        let next_ms = match schedule.first_reset {
            Some(first) => first.timestamp_millis(),
            None => now.timestamp_millis().saturating_add(interval_ms),
        };
        Self {
            interval_ms,
            next_ms: AtomicI64::new(next_ms),
        }
    }

    /// Returns `true` when `now` is past the scheduled boundary and this
    /// caller won the right to clear the store.
    ///
    /// The boundary advances by exactly one interval from its previous value,
    /// so after a long idle period consecutive calls catch up one interval at
    /// a time.
    pub fn poll(&self, now: DateTime<Utc>) -> bool {
        let now = now.timestamp_millis();
        let scheduled = self.next_ms.load(Ordering::Acquire);
        if scheduled >= now {
            return false;
        }
        self.next_ms
            .compare_exchange(
                scheduled,
                scheduled.saturating_add(self.interval_ms),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn next_reset(&self) -> DateTime<Utc> {
        let next = self.next_ms.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(next)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
