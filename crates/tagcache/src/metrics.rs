//! Cache metrics.
//!
//! Recorded through the `metrics` facade; installing an exporter is up to
//! the embedding application.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "tagcache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "tagcache_misses_total";
    pub const CACHE_STALE_TOTAL: &str = "tagcache_stale_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "tagcache_evictions_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "tagcache_invalidations_total";
    pub const CACHE_ENTRIES: &str = "tagcache_entries";
}

/// Record a cache hit.
pub fn record_cache_hit(tier: &str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier.to_string()).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(tier: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "tier" => tier.to_string()).increment(1);
}

/// Record a stale read that triggered a background refresh.
pub fn record_stale_hit() {
    counter!(names::CACHE_STALE_TOTAL).increment(1);
}

pub fn record_eviction() {
    counter!(names::CACHE_EVICTIONS_TOTAL).increment(1);
}

/// Record the outcome of one tag invalidation (`ok` or `error`).
pub fn record_invalidation(outcome: &'static str) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Set the number of cache entries.
pub fn set_cache_entries(tier: &str, count: usize) {
    gauge!(names::CACHE_ENTRIES, "tier" => tier.to_string()).set(count as f64);
}
