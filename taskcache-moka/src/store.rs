//! Moka store implementation.

use std::fmt;
use std::future::ready;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use taskcache_backend::{DeleteStatus, InitFn, InsertOptions, Store, StoreResult};
use taskcache_core::{CacheKey, EvictionHook, Expiration, StoreLabel};
use tracing::debug;

use crate::builder::{MokaStoreBuilder, NoCapacity};
use crate::metrics;

/// Entry of a [`MokaStore`]: the stored value with its insertion policy.
#[derive(Clone)]
pub(crate) struct StoredSlot<V> {
    pub(crate) id: u64,
    pub(crate) value: V,
    pub(crate) inserted_at: Instant,
    pub(crate) expiration: Expiration,
}

/// Bounded in-memory store powered by Moka.
///
/// Expiration is tracked per entry: every entry carries the lifetime and idle
/// timeout it was inserted with. Inserts for the same key are coalesced by
/// Moka's entry API, so the initializer of
/// [`get_or_insert_with`](Store::get_or_insert_with) runs once per live entry.
///
/// # Examples
///
/// ```
/// use taskcache_moka::MokaStore;
///
/// let store: MokaStore<String> = MokaStore::builder().max_entries(1_000).build();
/// ```
///
/// # Caveats
///
/// - When the store is full, Moka may evict or refuse to admit any entry,
///   including one whose computation is still in flight. Callers then simply
///   stop sharing that computation.
/// - Entry counts are approximate until pending maintenance tasks have run,
///   see [`run_pending_tasks`](Self::run_pending_tasks).
pub struct MokaStore<V> {
    pub(crate) cache: Cache<CacheKey, StoredSlot<V>>,
    pub(crate) next_id: Arc<AtomicU64>,
    pub(crate) label: StoreLabel,
}

impl<V> Clone for MokaStore<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            next_id: Arc::clone(&self.next_id),
            label: self.label.clone(),
        }
    }
}

impl<V> fmt::Debug for MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MokaStore")
            .field("label", &self.label)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl<V> MokaStore<V> {
    /// Creates a new builder for `MokaStore`.
    pub fn builder() -> MokaStoreBuilder<V, NoCapacity> {
        MokaStoreBuilder::new()
    }
}

impl<V> MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Approximate number of entries in the store.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs Moka's pending maintenance tasks, such as evictions.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Removes the entry under `key` if `predicate` accepts it.
    async fn remove_matching<F>(&self, key: &CacheKey, predicate: F) -> bool
    where
        F: FnOnce(&StoredSlot<V>) -> bool,
    {
        remove_matching(&self.cache, key, predicate).await
    }

    /// Hook removing the entry `id` under `key`, leaving any successor alone.
    fn eviction_hook(&self, key: CacheKey, id: u64) -> EvictionHook {
        let cache = self.cache.clone();
        let label = self.label.clone();
        Box::new(move || {
            async move {
                if remove_matching(&cache, &key, |stored| stored.id == id).await {
                    debug!(store = %label, %key, "entry evicted by trigger");
                }
            }
            .boxed()
        })
    }
}

async fn remove_matching<V, F>(
    cache: &Cache<CacheKey, StoredSlot<V>>,
    key: &CacheKey,
    predicate: F,
) -> bool
where
    V: Clone + Send + Sync + 'static,
    F: FnOnce(&StoredSlot<V>) -> bool,
{
    let result = cache
        .entry_by_ref(key)
        .and_compute_with(|current| {
            let op = match current {
                Some(entry) if predicate(entry.value()) => Op::Remove,
                _ => Op::Nop,
            };
            ready(op)
        })
        .await;
    matches!(result, CompResult::Removed(_))
}

#[async_trait]
impl<V> Store<V> for MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get_or_insert_with(
        &self,
        key: &CacheKey,
        init: InitFn<'_, V>,
        options: InsertOptions,
    ) -> StoreResult<V> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let expiration = options.expiration;
        let entry = self
            .cache
            .entry_by_ref(key)
            .or_insert_with(async move {
                StoredSlot {
                    id,
                    value: init(),
                    inserted_at: Instant::now(),
                    expiration,
                }
            })
            .await;

        if entry.is_fresh() {
            for trigger in options.triggers {
                trigger.register(self.eviction_hook(key.clone(), id)).await;
            }
            metrics::record_capacity(self.label.as_str(), self.cache.entry_count());
        }
        Ok(entry.into_value().value)
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Option<V>> {
        Ok(self.cache.get(key).await.map(|stored| stored.value))
    }

    async fn remove(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        match self.cache.remove(key).await {
            Some(_) => Ok(DeleteStatus::Deleted),
            None => Ok(DeleteStatus::Missing),
        }
    }

    async fn remove_if(
        &self,
        key: &CacheKey,
        predicate: &(dyn for<'p> Fn(&'p V) -> bool + Send + Sync),
    ) -> StoreResult<DeleteStatus> {
        if self.remove_matching(key, |stored| predicate(&stored.value)).await {
            Ok(DeleteStatus::Deleted)
        } else {
            Ok(DeleteStatus::Missing)
        }
    }

    async fn keys(&self) -> StoreResult<Vec<CacheKey>> {
        Ok(self
            .cache
            .iter()
            .map(|(key, _)| CacheKey::clone(&key))
            .collect())
    }

    fn label(&self) -> StoreLabel {
        self.label.clone()
    }
}
