//! Concurrent in-memory store.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use taskcache_core::{CacheKey, EvictionHook, Expiration, StoreLabel};
use tokio::time::Instant;
use tracing::debug;

use crate::store::{InitFn, InsertOptions, Store, StoreResult};
use crate::{DeleteStatus, StoreError};

struct StoredEntry<V> {
    id: u64,
    value: V,
    inserted_at: Instant,
    last_access: Instant,
    expiration: Expiration,
}

impl<V> StoredEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        let lifetime_over = self
            .expiration
            .time_to_live
            .is_some_and(|ttl| now >= self.inserted_at + ttl);
        let idle_over = self
            .expiration
            .time_to_idle
            .is_some_and(|idle| now >= self.last_access + idle);
        lifetime_over || idle_over
    }
}

struct MemoryStoreInner<V> {
    entries: DashMap<CacheKey, StoredEntry<V>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    label: StoreLabel,
}

/// In-memory store backed by a sharded concurrent map.
///
/// Per-key atomicity comes from the map's shard locks: the initializer of
/// [`get_or_insert_with`](Store::get_or_insert_with) runs while the key's
/// shard is locked, so concurrent callers for the same key observe exactly
/// one inserted value.
///
/// Expired entries are dropped lazily, on access, or in bulk by
/// [`purge_expired`](Self::purge_expired). Timestamps come from
/// [`tokio::time::Instant`], so a paused tokio clock drives expiration in
/// tests.
///
/// Cloning is cheap and clones share the same entries.
///
/// # Examples
///
/// ```
/// use taskcache_backend::MemoryStore;
///
/// let store: MemoryStore<u64> = MemoryStore::new();
/// assert!(store.is_empty());
/// ```
pub struct MemoryStore<V> {
    inner: Arc<MemoryStoreInner<V>>,
}

impl<V> Clone for MemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for MemoryStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("label", &self.inner.label)
            .field("entries", &self.inner.entries.len())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl<V> Default for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty store labelled `"memory"`.
    pub fn new() -> Self {
        Self::with_label(StoreLabel::new_static("memory"))
    }

    /// Creates an empty store with a custom label.
    pub fn with_label(label: impl Into<StoreLabel>) -> Self {
        Self {
            inner: Arc::new(MemoryStoreInner {
                entries: DashMap::new(),
                next_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                label: label.into(),
            }),
        }
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.inner.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Closes the store and drops all entries.
    ///
    /// Every later operation fails with [`StoreError::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.entries.clear();
        debug!(store = %self.inner.label, "memory store closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn new_entry(&self, value: V, expiration: Expiration, now: Instant) -> StoredEntry<V> {
        StoredEntry {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            value,
            inserted_at: now,
            last_access: now,
            expiration,
        }
    }

    /// Hook removing the entry `id` under `key`, leaving any successor alone.
    fn eviction_hook(&self, key: CacheKey, id: u64) -> EvictionHook {
        let inner = Arc::clone(&self.inner);
        Box::new(move || {
            async move {
                if inner.entries.remove_if(&key, |_, entry| entry.id == id).is_some() {
                    debug!(store = %inner.label, %key, "entry evicted by trigger");
                }
            }
            .boxed()
        })
    }
}

#[async_trait]
impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get_or_insert_with(
        &self,
        key: &CacheKey,
        init: InitFn<'_, V>,
        options: InsertOptions,
    ) -> StoreResult<V> {
        self.ensure_open()?;
        let now = Instant::now();

        // The shard lock is released at the end of this statement.
        let (value, inserted) = match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let entry = occupied.get_mut();
                entry.last_access = now;
                (entry.value.clone(), None)
            }
            Entry::Occupied(mut occupied) => {
                let entry = self.new_entry(init(), options.expiration, now);
                let inserted = (entry.value.clone(), Some(entry.id));
                occupied.insert(entry);
                inserted
            }
            Entry::Vacant(vacant) => {
                let entry = self.new_entry(init(), options.expiration, now);
                let inserted = (entry.value.clone(), Some(entry.id));
                vacant.insert(entry);
                inserted
            }
        };

        if let Some(id) = inserted {
            for trigger in options.triggers {
                trigger.register(self.eviction_hook(key.clone(), id)).await;
            }
        }
        Ok(value)
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Option<V>> {
        self.ensure_open()?;
        let now = Instant::now();

        let expired_id = match self.inner.entries.get_mut(key) {
            None => return Ok(None),
            Some(mut entry) if !entry.is_expired(now) => {
                entry.last_access = now;
                return Ok(Some(entry.value.clone()));
            }
            Some(entry) => entry.id,
        };

        self.inner
            .entries
            .remove_if(key, |_, entry| entry.id == expired_id);
        Ok(None)
    }

    async fn remove(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        self.ensure_open()?;
        let now = Instant::now();
        match self.inner.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(now) => Ok(DeleteStatus::Deleted),
            _ => Ok(DeleteStatus::Missing),
        }
    }

    async fn remove_if(
        &self,
        key: &CacheKey,
        predicate: &(dyn for<'p> Fn(&'p V) -> bool + Send + Sync),
    ) -> StoreResult<DeleteStatus> {
        self.ensure_open()?;
        let now = Instant::now();
        let removed = self
            .inner
            .entries
            .remove_if(key, |_, entry| !entry.is_expired(now) && predicate(&entry.value));
        match removed {
            Some(_) => Ok(DeleteStatus::Deleted),
            None => Ok(DeleteStatus::Missing),
        }
    }

    async fn keys(&self) -> StoreResult<Vec<CacheKey>> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self
            .inner
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn label(&self) -> StoreLabel {
        self.inner.label.clone()
    }
}
