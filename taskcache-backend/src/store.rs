use std::sync::Arc;

use async_trait::async_trait;
use taskcache_core::{CacheKey, CompletionTrigger, Expiration, StoreLabel};

use crate::{DeleteStatus, StoreError};

pub type StoreResult<T> = Result<T, StoreError>;

/// Initializer producing the value of a new entry.
pub type InitFn<'a, V> = Box<dyn FnOnce() -> V + Send + 'a>;

/// Policy applied to an entry when it is inserted.
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    /// Lifetime and idle timeout of the entry.
    pub expiration: Expiration,
    /// Each of these evicts the entry when fired.
    pub triggers: Vec<CompletionTrigger>,
}

impl InsertOptions {
    pub fn new(expiration: Expiration) -> Self {
        Self {
            expiration,
            triggers: Vec::new(),
        }
    }

    pub fn with_trigger(mut self, trigger: CompletionTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// Atomic keyed store.
///
/// Holds at most one live entry per key. Every operation is atomic with
/// respect to concurrent operations on the same key.
#[async_trait]
pub trait Store<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Returns the live value under `key`, inserting the result of `init` if
    /// there is none.
    ///
    /// `init` runs at most once and only if this call inserts. The insert
    /// options apply to the new entry only. The store evicts exactly the entry
    /// inserted here once any of `options.triggers` fires, even if it already
    /// fired before the insertion completed.
    async fn get_or_insert_with(
        &self,
        key: &CacheKey,
        init: InitFn<'_, V>,
        options: InsertOptions,
    ) -> StoreResult<V>;

    /// Returns the live value under `key`, refreshing its idle timeout.
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<V>>;

    /// Removes the entry under `key`.
    async fn remove(&self, key: &CacheKey) -> StoreResult<DeleteStatus>;

    /// Removes the entry under `key` if its value matches `predicate`.
    async fn remove_if(
        &self,
        key: &CacheKey,
        predicate: &(dyn for<'p> Fn(&'p V) -> bool + Send + Sync),
    ) -> StoreResult<DeleteStatus>;

    /// Returns a snapshot of the keys of all live entries.
    ///
    /// The snapshot is detached from the store: entries inserted or removed
    /// afterwards do not affect it.
    async fn keys(&self) -> StoreResult<Vec<CacheKey>>;

    /// Returns the label of this store used in logs and metrics.
    fn label(&self) -> StoreLabel {
        StoreLabel::new_static("store")
    }
}

#[async_trait]
impl<V, T> Store<V> for Arc<T>
where
    V: Clone + Send + Sync + 'static,
    T: Store<V> + ?Sized,
{
    async fn get_or_insert_with(
        &self,
        key: &CacheKey,
        init: InitFn<'_, V>,
        options: InsertOptions,
    ) -> StoreResult<V> {
        (**self).get_or_insert_with(key, init, options).await
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Option<V>> {
        (**self).get(key).await
    }

    async fn remove(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        (**self).remove(key).await
    }

    async fn remove_if(
        &self,
        key: &CacheKey,
        predicate: &(dyn for<'p> Fn(&'p V) -> bool + Send + Sync),
    ) -> StoreResult<DeleteStatus> {
        (**self).remove_if(key, predicate).await
    }

    async fn keys(&self) -> StoreResult<Vec<CacheKey>> {
        (**self).keys().await
    }

    fn label(&self) -> StoreLabel {
        (**self).label()
    }
}
