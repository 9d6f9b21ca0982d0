//! Moka store capacity metrics.
//!
//! This module provides metrics for monitoring Moka store utilization.
//! Enable the `metrics` feature to use these metrics.
//!
//! ## Metrics
//!
//! - `taskcache_moka_entries` - Current number of entries in the store (gauge)
//!
//! The gauge includes a `store` label to distinguish between multiple Moka instances.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for store entry count gauge.
    pub static ref MOKA_ENTRIES: &'static str = {
        metrics::describe_gauge!(
            "taskcache_moka_entries",
            "Current number of entries in the Moka store."
        );
        "taskcache_moka_entries"
    };
}

/// Record current store capacity metrics.
///
/// # Arguments
///
/// * `store` - Store label for metric identification
/// * `entries` - Current number of entries in the store
#[cfg(feature = "metrics")]
#[inline]
pub fn record_capacity(store: &str, entries: u64) {
    metrics::gauge!(*MOKA_ENTRIES, "store" => store.to_string()).set(entries as f64);
}

/// Record current store capacity metrics (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_capacity(_store: &str, _entries: u64) {}
