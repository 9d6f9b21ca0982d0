#![warn(missing_docs)]
//! # taskcache-core
//!
//! Core types shared by the taskcache crates.
//!
//! `taskcache` memoizes asynchronous computations per key: concurrent callers
//! for the same key share a single in-flight computation, failed computations
//! are evicted instead of poisoning the cache, and callers whose computation was
//! invalidated mid-flight transparently receive the freshest result.
//!
//! This crate holds the vocabulary that both the cache and its stores speak:
//!
//! - [`CacheKey`] - validated, non-empty key of a cache entry
//! - [`StoreLabel`] - identifier of a store instance in logs and metrics
//! - [`EntryOptions`] - per-entry expiration policy
//! - [`Expiration`] - expiration policy resolved for a store insertion
//! - [`CompletionTrigger`] - one-shot hook evicting an entry when its computation finishes

pub mod key;
pub mod label;
pub mod options;
pub mod trigger;

pub use key::{CacheKey, KeyError};
pub use label::StoreLabel;
pub use options::{EntryOptions, Expiration, OptionsError};
#[doc(hidden)]
pub use smol_str::SmolStr;
pub use trigger::{CompletionTrigger, EvictionHook};
