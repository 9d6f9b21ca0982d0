//! Metrics declaration and recording.
//!
//! Enable the `metrics` feature to record through the `metrics` facade.
//! Without it every `record_*` function is an empty inline call.
//!
//! ## Metrics
//!
//! - `taskcache_slot_created_total` - computations started (counter)
//! - `taskcache_slot_joined_total` - callers that joined an existing computation (counter)
//! - `taskcache_retry_total` - callers retried after their computation was replaced (counter)
//! - `taskcache_factory_failure_total` - failed, panicked or cancelled computations (counter)
//! - `taskcache_invalidation_total` - entries removed by invalidation (counter)
//! - `taskcache_clear_total` - calls to clear (counter)
//! - `taskcache_factory_duration_seconds` - factory run time (histogram)
//!
//! Counters carry a `store` label naming the store instance.

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Single-flight metrics

    /// Track number of computations started.
    pub static ref SLOT_CREATED: &'static str = {
        metrics::describe_counter!(
            "taskcache_slot_created_total",
            "Total number of computations started."
        );
        "taskcache_slot_created_total"
    };
    /// Track number of callers joining an in-flight or completed computation.
    pub static ref SLOT_JOINED: &'static str = {
        metrics::describe_counter!(
            "taskcache_slot_joined_total",
            "Total number of callers served by an existing computation."
        );
        "taskcache_slot_joined_total"
    };
    /// Track number of freshness retries.
    pub static ref RETRY: &'static str = {
        metrics::describe_counter!(
            "taskcache_retry_total",
            "Total number of retries after a computation was invalidated."
        );
        "taskcache_retry_total"
    };
    /// Track number of failed computations.
    pub static ref FACTORY_FAILURE: &'static str = {
        metrics::describe_counter!(
            "taskcache_factory_failure_total",
            "Total number of failed computations evicted from the cache."
        );
        "taskcache_factory_failure_total"
    };

    // Invalidation metrics

    /// Track number of invalidated entries.
    pub static ref INVALIDATION: &'static str = {
        metrics::describe_counter!(
            "taskcache_invalidation_total",
            "Total number of entries removed by invalidation."
        );
        "taskcache_invalidation_total"
    };
    /// Track number of clear calls.
    pub static ref CLEAR: &'static str = {
        metrics::describe_counter!(
            "taskcache_clear_total",
            "Total number of cache clears."
        );
        "taskcache_clear_total"
    };

    // Latency metrics

    /// Histogram of factory run time.
    pub static ref FACTORY_DURATION: &'static str = {
        metrics::describe_histogram!(
            "taskcache_factory_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of factory computations in seconds."
        );
        "taskcache_factory_duration_seconds"
    };
}

/// What happened to a caller of `get_or_create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Created,
    Joined,
    Retried,
    Failed,
    Invalidated,
    Cleared,
}

/// Record a cache event for the store labelled `store`.
#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record(store: &str, event: Event) {
    let name = match event {
        Event::Created => *SLOT_CREATED,
        Event::Joined => *SLOT_JOINED,
        Event::Retried => *RETRY,
        Event::Failed => *FACTORY_FAILURE,
        Event::Invalidated => *INVALIDATION,
        Event::Cleared => *CLEAR,
    };
    metrics::counter!(name, "store" => store.to_string()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record(_store: &str, _event: Event) {}

/// Record the run time of one factory computation.
#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_factory_duration(duration: Duration) {
    metrics::histogram!(*FACTORY_DURATION).record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_factory_duration(_duration: Duration) {}
