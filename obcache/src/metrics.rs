//! Metrics declaration and initialization.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "obcache_hit_total",
            "Total number of memoized calls answered from the store."
        );
        "obcache_hit_total"
    };
    /// Track number of underlying invocations.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "obcache_miss_total",
            "Total number of memoized calls that invoked the wrapped operation."
        );
        "obcache_miss_total"
    };
    /// Track number of scheduled store clears.
    pub static ref CACHE_RESET_COUNTER: &'static str = {
        metrics::describe_counter!(
            "obcache_reset_total",
            "Total number of scheduled store resets."
        );
        "obcache_reset_total"
    };
    /// Gauge of keys with an invocation in flight.
    pub static ref CACHE_PENDING_GAUGE: &'static str = {
        metrics::describe_gauge!(
            "obcache_pending",
            "Number of keys with an underlying invocation in flight."
        );
        "obcache_pending"
    };
}

#[cfg(feature = "metrics")]
#[inline]
pub fn record_hit(operation: &str) {
    metrics::counter!(*CACHE_HIT_COUNTER, "operation" => operation.to_string()).increment(1);
}

#[cfg(feature = "metrics")]
#[inline]
pub fn record_miss(operation: &str) {
    metrics::counter!(*CACHE_MISS_COUNTER, "operation" => operation.to_string()).increment(1);
}

#[cfg(feature = "metrics")]
#[inline]
pub fn record_reset() {
    metrics::counter!(*CACHE_RESET_COUNTER).increment(1);
}

#[cfg(feature = "metrics")]
#[inline]
pub fn record_pending(operation: &str, delta: f64) {
    metrics::gauge!(*CACHE_PENDING_GAUGE, "operation" => operation.to_string()).increment(delta);
}

/// No-op versions when the metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_hit(_operation: &str) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_miss(_operation: &str) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_reset() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_pending(_operation: &str, _delta: f64) {}
