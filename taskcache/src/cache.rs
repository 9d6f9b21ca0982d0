//! Single-flight keyed cache.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use chrono::Utc;
use taskcache_backend::{InsertOptions, MemoryStore, Store, StoreResult};
use taskcache_core::{CacheKey, CompletionTrigger, EntryOptions, StoreLabel};
use tracing::{Instrument, debug, debug_span, warn};

use crate::error::CacheError;
use crate::metrics::{self, Event};
use crate::slot::{Slot, SpawnOptions};

/// Memoizes asynchronous computations per key.
///
/// Concurrent callers of [`get_or_create`](Self::get_or_create) for the same
/// key share one computation. A failed computation is evicted so the next
/// caller starts over, and a caller whose computation was invalidated while it
/// was waiting transparently waits for the replacement instead of returning a
/// stale value.
///
/// Entries live in a [`Store`] of [`Slot`]s, [`MemoryStore`] by default.
/// Cloning the cache is cheap when the store is, and clones share entries.
///
/// # Examples
///
/// ```
/// use taskcache::{CacheKey, TaskCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: TaskCache<u64, std::io::Error> = TaskCache::new();
/// let key = CacheKey::new("answer").unwrap();
///
/// let value = cache.get_or_create(&key, || async { Ok(42) }).await.unwrap();
/// assert_eq!(value, 42);
///
/// // Served from the cache, the factory is not called again.
/// let value = cache.get_or_create(&key, || async { Ok(0) }).await.unwrap();
/// assert_eq!(value, 42);
/// # }
/// ```
pub struct TaskCache<V, E, S = MemoryStore<Slot<V, E>>> {
    store: S,
    defaults: EntryOptions,
    _marker: PhantomData<fn() -> (V, E)>,
}

impl<V, E, S: Clone> Clone for TaskCache<V, E, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            defaults: self.defaults.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V, E, S: fmt::Debug> fmt::Debug for TaskCache<V, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCache")
            .field("store", &self.store)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl<V, E> TaskCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates a cache over a new [`MemoryStore`] with default entry options.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Creates a new [`TaskCacheBuilder`].
    pub fn builder() -> TaskCacheBuilder<V, E, MemoryStore<Slot<V, E>>> {
        TaskCacheBuilder::new()
    }
}

impl<V, E> Default for TaskCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E, S> TaskCache<V, E, S>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    S: Store<Slot<V, E>>,
{
    /// Creates a cache over `store` with default entry options.
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            defaults: EntryOptions::default(),
            _marker: PhantomData,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the options used by [`get_or_create`](Self::get_or_create).
    pub fn default_options(&self) -> &EntryOptions {
        &self.defaults
    }

    /// Returns the value under `key`, computing it with `factory` if needed.
    ///
    /// Uses the cache's [default options](Self::default_options). See
    /// [`get_or_create_with`](Self::get_or_create_with).
    pub async fn get_or_create<F, Fut>(&self, key: &CacheKey, factory: F) -> Result<V, CacheError<E>>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.get_or_create_with(key, factory, &self.defaults).await
    }

    /// Returns the value under `key`, computing it with `factory` if needed.
    ///
    /// If a computation for `key` is already cached or in flight, the caller
    /// joins it and `factory` is not called. Otherwise `factory` is called
    /// once and its future is spawned on the current tokio runtime; dropping
    /// the returned future does not cancel the computation.
    ///
    /// Once the computation succeeds the store is read again:
    ///
    /// - the same computation is still current: its value is returned;
    /// - another computation replaced it: the caller retries and waits for
    ///   that one;
    /// - the key is empty because the computation was invalidated or cleared:
    ///   the caller retries, starting a new computation;
    /// - the key is empty because the entry expired: the value is returned.
    ///
    /// A failed computation removes its own entry from the store before any
    /// caller observes the failure, even if every caller has been dropped.
    /// A successor entry is never removed. Every caller waiting on it receives
    /// the same error, and nothing is retried on failure.
    ///
    /// The store is read twice per call, once to find or insert the entry and
    /// once for the recheck, and each read refreshes the entry's sliding
    /// expiration.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Options`] if `options` are invalid, the factory
    /// outcome if it failed, panicked or was cancelled, and
    /// [`CacheError::Store`] if the store fails. A store failure while
    /// evicting a failed computation is logged and the factory outcome is
    /// returned.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub async fn get_or_create_with<F, Fut>(
        &self,
        key: &CacheKey,
        factory: F,
        options: &EntryOptions,
    ) -> Result<V, CacheError<E>>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        options.validate()?;
        let label = self.store.label();
        let span = debug_span!("taskcache.get_or_create", key = %key, store = %label);

        self.resolve(key, &factory, options, &label)
            .instrument(span)
            .await
    }

    async fn resolve<F, Fut>(
        &self,
        key: &CacheKey,
        factory: &F,
        options: &EntryOptions,
        label: &StoreLabel,
    ) -> Result<V, CacheError<E>>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        loop {
            let on_failure = CompletionTrigger::new();
            let mut spawn = SpawnOptions::new(label.clone()).on_failure(on_failure.clone());
            let mut insert =
                InsertOptions::new(options.expiration(Utc::now())).with_trigger(on_failure);
            if options.expire_on_completion {
                let on_completion = CompletionTrigger::new();
                spawn = spawn.on_completion(on_completion.clone());
                insert = insert.with_trigger(on_completion);
            }

            let mut created = false;
            let slot = {
                let created = &mut created;
                self.store
                    .get_or_insert_with(
                        key,
                        Box::new(move || {
                            *created = true;
                            Slot::spawn(key.clone(), factory(), spawn)
                        }),
                        insert,
                    )
                    .await?
            };

            if created {
                debug!("computation started");
                metrics::record(label.as_str(), Event::Created);
            } else {
                debug!(completed = slot.is_completed(), "joined computation");
                metrics::record(label.as_str(), Event::Joined);
            }

            match slot.result().await {
                Ok(value) => match self.store.get(key).await? {
                    Some(current) if !current.ptr_eq(&slot) => {
                        debug!("computation replaced while awaited, retrying");
                        metrics::record(label.as_str(), Event::Retried);
                    }
                    None if slot.is_detached() => {
                        debug!("computation invalidated while awaited, retrying");
                        metrics::record(label.as_str(), Event::Retried);
                    }
                    _ => return Ok(value),
                },
                Err(err) => {
                    let evicted = self
                        .store
                        .remove_if(key, &|current: &Slot<V, E>| current.ptr_eq(&slot))
                        .await;
                    match evicted {
                        Ok(status) if status.is_deleted() => {
                            debug!("failed computation evicted by caller");
                        }
                        Ok(_) => {}
                        Err(store_err) => {
                            warn!(error = %store_err, "failed to evict failed computation");
                        }
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Removes the entry under `key`.
    ///
    /// Callers still waiting on the removed computation retry once it
    /// completes, so none of them returns its value. The computation itself
    /// keeps running. Returns `true` if an entry was removed.
    pub async fn invalidate(&self, key: &CacheKey) -> StoreResult<bool> {
        let Some(slot) = self.store.get(key).await? else {
            return Ok(false);
        };
        slot.detach();

        let removed = self
            .store
            .remove_if(key, &|current: &Slot<V, E>| current.ptr_eq(&slot))
            .await?
            .is_deleted();
        if removed {
            debug!(%key, store = %self.store.label(), "entry invalidated");
            metrics::record(self.store.label().as_str(), Event::Invalidated);
        }
        Ok(removed)
    }

    /// Returns `true` if an entry, complete or in flight, is stored under `key`.
    ///
    /// Like any read, this refreshes the entry's sliding expiration.
    pub async fn contains(&self, key: &CacheKey) -> StoreResult<bool> {
        Ok(self.store.get(key).await?.is_some())
    }

    /// Invalidates every entry present when the call starts.
    ///
    /// Entries inserted while the cache is being cleared are kept.
    pub async fn clear(&self) -> StoreResult<()> {
        let keys = self.store.keys().await?;
        let mut removed = 0usize;
        for key in &keys {
            if self.invalidate(key).await? {
                removed += 1;
            }
        }

        let label = self.store.label();
        debug!(store = %label, removed, "cache cleared");
        metrics::record(label.as_str(), Event::Cleared);
        Ok(())
    }
}

/// Builder for [`TaskCache`].
///
/// Use [`TaskCache::builder()`] to create a new builder. The store defaults
/// to a new [`MemoryStore`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use taskcache::{EntryOptions, MemoryStore, TaskCache};
///
/// let cache: TaskCache<String, String, _> = TaskCache::builder()
///     .store(MemoryStore::with_label("users"))
///     .default_options(EntryOptions::new().time_to_live(Duration::from_secs(60)))
///     .build();
/// assert_eq!(
///     cache.default_options().time_to_live,
///     Some(Duration::from_secs(60))
/// );
/// ```
pub struct TaskCacheBuilder<V, E, S> {
    store: S,
    defaults: EntryOptions,
    _marker: PhantomData<fn() -> (V, E)>,
}

impl<V, E> TaskCacheBuilder<V, E, MemoryStore<Slot<V, E>>>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates a new builder over a new [`MemoryStore`].
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            defaults: EntryOptions::default(),
            _marker: PhantomData,
        }
    }
}

impl<V, E> Default for TaskCacheBuilder<V, E, MemoryStore<Slot<V, E>>>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E, S> TaskCacheBuilder<V, E, S> {
    /// Sets the store.
    pub fn store<NewS>(self, store: NewS) -> TaskCacheBuilder<V, E, NewS> {
        TaskCacheBuilder {
            store,
            defaults: self.defaults,
            _marker: PhantomData,
        }
    }

    /// Sets the options used by [`TaskCache::get_or_create`].
    pub fn default_options(self, defaults: EntryOptions) -> Self {
        Self { defaults, ..self }
    }
}

impl<V, E, S> TaskCacheBuilder<V, E, S>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    S: Store<Slot<V, E>>,
{
    /// Builds the [`TaskCache`].
    pub fn build(self) -> TaskCache<V, E, S> {
        TaskCache {
            store: self.store,
            defaults: self.defaults,
            _marker: PhantomData,
        }
    }
}
