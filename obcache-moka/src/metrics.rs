//! Entry count gauge, recorded when the `metrics` feature is enabled.
//!
//! `obcache_moka_entries{store}` follows every write, removal and reset of a
//! [`MokaStore`](crate::MokaStore). Moka counts lazily, so the value can trail
//! the true size until the cache runs its pending maintenance.

#[cfg(feature = "metrics")]
lazy_static::lazy_static! {
    static ref ENTRIES_GAUGE: &'static str = {
        metrics::describe_gauge!(
            "obcache_moka_entries",
            metrics::Unit::Count,
            "Entries held by an in-process obcache store."
        );
        "obcache_moka_entries"
    };
}

#[cfg(feature = "metrics")]
pub(crate) fn record_entries(store: &str, entries: u64) {
    metrics::gauge!(*ENTRIES_GAUGE, "store" => store.to_owned()).set(entries as f64);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_entries(_store: &str, _entries: u64) {}
