//! Deferred computation slot.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use smol_str::SmolStr;
use taskcache_core::{CacheKey, CompletionTrigger, StoreLabel};
use tracing::{Instrument, debug, debug_span, warn};

use crate::error::CacheError;
use crate::metrics::{self, Event};

type SlotFuture<V, E> = Shared<BoxFuture<'static, Result<V, CacheError<E>>>>;

struct SlotInner<V, E> {
    key: CacheKey,
    expire_on_completion: bool,
    detached: AtomicBool,
    result: SlotFuture<V, E>,
}

/// Triggers fired by a [`Slot`] computation, and the store it reports to.
///
/// Both triggers fire inside the computation's task before its outcome
/// becomes visible, so they run even when nobody awaits the slot.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    store: StoreLabel,
    on_completion: Option<CompletionTrigger>,
    on_failure: Option<CompletionTrigger>,
}

impl SpawnOptions {
    /// Options reporting to `store`, with no triggers.
    pub fn new(store: impl Into<StoreLabel>) -> Self {
        Self {
            store: store.into(),
            on_completion: None,
            on_failure: None,
        }
    }

    /// Fires `trigger` once the computation is over, whatever the outcome.
    pub fn on_completion(mut self, trigger: CompletionTrigger) -> Self {
        self.on_completion = Some(trigger);
        self
    }

    /// Fires `trigger` if the computation fails, panics or is cancelled.
    pub fn on_failure(mut self, trigger: CompletionTrigger) -> Self {
        self.on_failure = Some(trigger);
        self
    }

    async fn finish<V, E>(&self, outcome: &Result<V, CacheError<E>>) {
        if let Err(err) = outcome {
            debug!(store = %self.store, cancelled = matches!(err, CacheError::Cancelled), "computation failed");
            metrics::record(self.store.as_str(), Event::Failed);
            if let Some(trigger) = &self.on_failure {
                trigger.fire().await;
            }
        }
        if let Some(trigger) = &self.on_completion {
            trigger.fire().await;
        }
    }
}

/// Shared, single-execution holder of one asynchronous computation.
///
/// The computation starts as soon as the slot is created, on the current
/// tokio runtime, whether or not anybody awaits it. Every observer of
/// [`result`](Self::result) receives the same outcome: a clone of the value,
/// or the same `Arc`'d failure.
///
/// Cloning a slot creates another handle to the same computation; use
/// [`ptr_eq`](Self::ptr_eq) to compare slots by identity.
pub struct Slot<V, E> {
    inner: Arc<SlotInner<V, E>>,
}

impl<V, E> Clone for Slot<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone, E> fmt::Debug for Slot<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("key", &self.inner.key)
            .field("completed", &self.is_completed())
            .field("detached", &self.is_detached())
            .field("expire_on_completion", &self.inner.expire_on_completion)
            .finish()
    }
}

impl<V, E> Slot<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Spawns `future` and wraps it in a new slot.
    ///
    /// The triggers in `options` fire once the computation is over, before
    /// the result becomes visible to observers.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn<Fut>(key: CacheKey, future: Fut, options: SpawnOptions) -> Self
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let expire_on_completion = options.on_completion.is_some();
        let span = debug_span!("taskcache.factory", key = %key, store = %options.store);
        let task_options = options.clone();

        let handle = tokio::spawn(
            async move {
                let start = Instant::now();
                let outcome = AssertUnwindSafe(future).catch_unwind().await;
                metrics::record_factory_duration(start.elapsed());
                let outcome = match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(CacheError::Factory(Arc::new(err))),
                    Err(payload) => {
                        let message = panic_message(payload);
                        warn!(%message, "factory panicked");
                        Err(CacheError::Panicked(message))
                    }
                };
                task_options.finish(&outcome).await;
                outcome
            }
            .instrument(span),
        );

        let result = async move {
            match handle.await {
                Ok(result) => result,
                Err(_) => {
                    let outcome = Err(CacheError::Cancelled);
                    options.finish(&outcome).await;
                    outcome
                }
            }
        }
        .boxed()
        .shared();

        Self {
            inner: Arc::new(SlotInner {
                key,
                expire_on_completion,
                detached: AtomicBool::new(false),
                result,
            }),
        }
    }

    /// Waits for the computation and returns its outcome.
    pub async fn result(&self) -> Result<V, CacheError<E>> {
        self.inner.result.clone().await
    }
}

impl<V, E> Slot<V, E> {
    /// Key the slot was created for.
    pub fn key(&self) -> &CacheKey {
        &self.inner.key
    }

    /// Returns `true` if both handles refer to the same computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` once an observer has seen the outcome.
    pub fn is_completed(&self) -> bool
    where
        V: Clone,
    {
        self.inner.result.peek().is_some()
    }

    /// Returns `true` if the slot's store entry is evicted on completion.
    pub fn expires_on_completion(&self) -> bool {
        self.inner.expire_on_completion
    }

    /// Returns `true` if the slot was explicitly removed from its store.
    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::Acquire)
    }

    pub(crate) fn detach(&self) {
        self.inner.detached.store(true, Ordering::Release);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> SmolStr {
    if let Some(message) = payload.downcast_ref::<&str>() {
        SmolStr::new(message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        SmolStr::new(message)
    } else {
        SmolStr::new_static("non-string panic payload")
    }
}
