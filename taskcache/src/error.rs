use std::sync::Arc;

use smol_str::SmolStr;
use taskcache_backend::StoreError;
use taskcache_core::OptionsError;
use thiserror::Error;

/// Error returned by [`TaskCache::get_or_create`](crate::TaskCache::get_or_create).
///
/// Factory failures are shared: every caller awaiting the same computation
/// receives a clone of the same `Arc<E>`.
#[derive(Debug, Error)]
pub enum CacheError<E> {
    /// The factory returned an error.
    #[error("{0}")]
    Factory(Arc<E>),

    /// The factory panicked.
    #[error("factory panicked: {0}")]
    Panicked(SmolStr),

    /// The factory task was cancelled before completing, e.g. by runtime shutdown.
    #[error("factory task was cancelled")]
    Cancelled,

    /// Invalid entry options.
    #[error(transparent)]
    Options(#[from] OptionsError),

    /// The store failed.
    #[error(transparent)]
    Store(Arc<StoreError>),
}

impl<E> CacheError<E> {
    /// Returns the factory error, if this is one.
    pub fn factory_error(&self) -> Option<&Arc<E>> {
        match self {
            Self::Factory(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` if the computation itself failed rather than the cache.
    pub fn is_factory(&self) -> bool {
        matches!(self, Self::Factory(_) | Self::Panicked(_) | Self::Cancelled)
    }
}

impl<E> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Factory(err) => Self::Factory(Arc::clone(err)),
            Self::Panicked(message) => Self::Panicked(message.clone()),
            Self::Cancelled => Self::Cancelled,
            Self::Options(err) => Self::Options(*err),
            Self::Store(err) => Self::Store(Arc::clone(err)),
        }
    }
}

impl<E> From<StoreError> for CacheError<E> {
    fn from(err: StoreError) -> Self {
        Self::Store(Arc::new(err))
    }
}
