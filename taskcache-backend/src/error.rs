//! Error types for store operations.

use thiserror::Error;

/// Error type for store operations.
///
/// Stores do not fail under normal operation; an error means the store itself
/// is unusable and is surfaced to the caller immediately.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal store error, state or computation error.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),

    /// The store was closed and can no longer be used.
    #[error("store is closed")]
    Closed,
}
