//! Traits and structs for taskcache store interaction.
//!
//! A store is the single source of truth for which value is current under a
//! key. The single-flight cache relies on nothing but the per-key atomicity
//! of [`Store::get_or_insert_with`] and the identity-checked
//! [`Store::remove_if`]; if you want to implement your own store, you are in
//! the right place.
//!
//! [`MemoryStore`] is the default store: a sharded concurrent map with lazy
//! expiration.
mod error;
mod memory;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{InitFn, InsertOptions, Store, StoreResult};

/// Status of deleting result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Record successfully deleted.
    Deleted,
    /// Record already missing.
    Missing,
}

impl DeleteStatus {
    /// Returns `true` if a record was removed.
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}
