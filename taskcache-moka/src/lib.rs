#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # taskcache-moka
//!
//! Bounded in-memory [`Store`](taskcache_backend::Store) for taskcache,
//! powered by [Moka](https://docs.rs/moka).
//!
//! ```
//! use taskcache::TaskCache;
//! use taskcache_moka::MokaStore;
//!
//! let cache: TaskCache<String, String, _> = TaskCache::builder()
//!     .store(MokaStore::builder().max_entries(10_000).label("users").build())
//!     .build();
//! # let _ = cache;
//! ```
//!
//! ## Feature flags
//!
//! - `metrics` - report the number of stored entries, see [`mod@metrics`].

mod builder;
pub mod metrics;
mod store;

pub use builder::{EntryCapacity, MokaStoreBuilder, NoCapacity, Unbounded};
pub use moka::policy::EvictionPolicy;
pub use store::MokaStore;
