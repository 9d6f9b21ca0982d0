#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # taskcache
//!
//! Single-flight asynchronous memoization.
//!
//! [`TaskCache`] maps keys to asynchronous computations. For any key at most
//! one computation runs at a time and every concurrent caller shares its
//! outcome:
//!
//! - **single flight** - the factory runs once per key, no matter how many
//!   callers ask for it concurrently;
//! - **no negative caching** - a failed computation is evicted, so the next
//!   caller starts a fresh one, while callers already waiting receive the
//!   same error;
//! - **freshness** - a caller whose computation was invalidated while it was
//!   waiting never returns that value: it waits for the replacement instead.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use taskcache::{CacheKey, TaskCache};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: TaskCache<String, String> = TaskCache::new();
//! let key = CacheKey::new("user:42").unwrap();
//! let calls = Arc::new(AtomicUsize::new(0));
//!
//! let factory = || {
//!     let calls = Arc::clone(&calls);
//!     async move {
//!         calls.fetch_add(1, Ordering::SeqCst);
//!         Ok("Ada".to_string())
//!     }
//! };
//!
//! let (a, b) = tokio::join!(
//!     cache.get_or_create(&key, factory),
//!     cache.get_or_create(&key, factory),
//! );
//! assert_eq!(a.unwrap(), "Ada");
//! assert_eq!(b.unwrap(), "Ada");
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//!
//! cache.invalidate(&key).await.unwrap();
//! assert!(!cache.contains(&key).await.unwrap());
//! # }
//! ```
//!
//! Entries live in a [`Store`]. The default [`MemoryStore`] is a sharded
//! concurrent map; the `taskcache-moka` crate provides a bounded store.
//!
//! ## Feature flags
//!
//! - `metrics` - record counters and histograms through the
//!   [`metrics`](https://docs.rs/metrics) facade, see [`mod@metrics`].

mod cache;
mod error;
mod slot;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, this module records counters for
/// created, joined, retried and failed computations, invalidations and
/// clears, and a histogram of factory run time.
pub mod metrics;

pub use cache::{TaskCache, TaskCacheBuilder};
pub use error::CacheError;
pub use slot::{Slot, SpawnOptions};

pub use taskcache_backend::{
    DeleteStatus, InitFn, InsertOptions, MemoryStore, Store, StoreError, StoreResult,
};
pub use taskcache_core::{
    CacheKey, CompletionTrigger, EntryOptions, Expiration, KeyError, OptionsError, StoreLabel,
};
