//! Builder for configuring [`MokaStore`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::{Cache, CacheBuilder};
use moka::policy::EvictionPolicy;
use taskcache_core::{CacheKey, StoreLabel};

use crate::store::{MokaStore, StoredSlot};

/// Per-entry expiration computed from the policy stored with each entry.
///
/// The lifetime counts from insertion and is never extended. The idle timeout
/// restarts on every read but is capped by what is left of the lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct EntryExpiry;

impl EntryExpiry {
    fn remaining<V>(value: &StoredSlot<V>, now: Instant) -> Option<Duration> {
        let remaining_ttl = value
            .expiration
            .time_to_live
            .map(|ttl| ttl.saturating_sub(now.saturating_duration_since(value.inserted_at)));
        value.expiration.next_expiry(remaining_ttl)
    }
}

impl<V> Expiry<CacheKey, StoredSlot<V>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &StoredSlot<V>,
        created_at: Instant,
    ) -> Option<Duration> {
        Self::remaining(value, created_at)
    }

    fn expire_after_read(
        &self,
        _key: &CacheKey,
        value: &StoredSlot<V>,
        read_at: Instant,
        _duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        Self::remaining(value, read_at)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &StoredSlot<V>,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Always follow the new entry's policy, not the replaced one's.
        Self::remaining(value, updated_at)
    }
}

/// Marker type: capacity has not been configured yet.
///
/// This is the initial state of a [`MokaStoreBuilder`]. You must call either
/// [`max_entries()`](MokaStoreBuilder::max_entries) or
/// [`unbounded()`](MokaStoreBuilder::unbounded) before calling `build()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapacity;

/// Marker type: entry-count capacity has been configured.
///
/// The store will hold at most `n` entries.
#[derive(Debug, Clone, Copy)]
pub struct EntryCapacity(pub(crate) u64);

/// Marker type: the store has no capacity limit.
///
/// Entries leave the store only by expiration or removal.
#[derive(Debug, Clone, Copy)]
pub struct Unbounded;

/// Builder for creating and configuring a [`MokaStore`].
///
/// Use [`MokaStore::builder`] to create a new builder instance.
///
/// # Capacity Configuration (Required)
///
/// You must configure capacity using exactly one of:
/// - [`max_entries(n)`](Self::max_entries) - limit by entry count
/// - [`unbounded()`](Self::unbounded) - no limit
///
/// `build()` is only available after setting capacity.
///
/// # Examples
///
/// ```
/// use taskcache_moka::{EvictionPolicy, MokaStore};
///
/// let store: MokaStore<u64> = MokaStore::builder()
///     .max_entries(10_000)
///     .label("sessions")
///     .eviction_policy(EvictionPolicy::lru())
///     .build();
/// ```
pub struct MokaStoreBuilder<V, Cap> {
    capacity: Cap,
    label: StoreLabel,
    eviction_policy: Option<EvictionPolicy>,
    _value: PhantomData<fn() -> V>,
}

impl<V> MokaStoreBuilder<V, NoCapacity> {
    /// Creates a new builder with no capacity configured.
    pub fn new() -> Self {
        Self {
            capacity: NoCapacity,
            label: StoreLabel::new_static("moka"),
            eviction_policy: None,
            _value: PhantomData,
        }
    }

    /// Sets the maximum number of entries the store can hold.
    ///
    /// When the store exceeds this capacity, entries are evicted according to
    /// the [eviction policy](Self::eviction_policy).
    pub fn max_entries(self, capacity: u64) -> MokaStoreBuilder<V, EntryCapacity> {
        MokaStoreBuilder {
            capacity: EntryCapacity(capacity),
            label: self.label,
            eviction_policy: self.eviction_policy,
            _value: PhantomData,
        }
    }

    /// Removes the capacity limit.
    pub fn unbounded(self) -> MokaStoreBuilder<V, Unbounded> {
        MokaStoreBuilder {
            capacity: Unbounded,
            label: self.label,
            eviction_policy: self.eviction_policy,
            _value: PhantomData,
        }
    }
}

impl<V> Default for MokaStoreBuilder<V, NoCapacity> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, Cap> MokaStoreBuilder<V, Cap> {
    /// Sets a custom label for this store.
    ///
    /// The label appears in tracing fields, metrics and debug output.
    ///
    /// # Default
    ///
    /// `"moka"`
    pub fn label(mut self, label: impl Into<StoreLabel>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the eviction policy for the store.
    ///
    /// # Default
    ///
    /// [`EvictionPolicy::tiny_lfu()`]: LRU eviction combined with LFU
    /// admission.
    ///
    /// # Options
    ///
    /// | Policy | Description | Best for |
    /// |--------|-------------|----------|
    /// | [`tiny_lfu()`](EvictionPolicy::tiny_lfu) | LRU eviction + LFU admission | General caching |
    /// | [`lru()`](EvictionPolicy::lru) | Pure least-recently-used | Recency-biased workloads |
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    fn finish(
        label: StoreLabel,
        builder: CacheBuilder<CacheKey, StoredSlot<V>, Cache<CacheKey, StoredSlot<V>>>,
        policy: Option<EvictionPolicy>,
    ) -> MokaStore<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let cache = builder
            .eviction_policy(policy.unwrap_or_else(EvictionPolicy::tiny_lfu))
            .expire_after(EntryExpiry)
            .build();

        MokaStore {
            cache,
            next_id: Arc::new(AtomicU64::new(0)),
            label,
        }
    }
}

impl<V> MokaStoreBuilder<V, EntryCapacity>
where
    V: Clone + Send + Sync + 'static,
{
    /// Builds the [`MokaStore`] with entry-count based capacity.
    pub fn build(self) -> MokaStore<V> {
        Self::finish(
            self.label,
            CacheBuilder::new(self.capacity.0),
            self.eviction_policy,
        )
    }
}

impl<V> MokaStoreBuilder<V, Unbounded>
where
    V: Clone + Send + Sync + 'static,
{
    /// Builds the [`MokaStore`] without a capacity limit.
    pub fn build(self) -> MokaStore<V> {
        Self::finish(self.label, CacheBuilder::default(), self.eviction_policy)
    }
}
