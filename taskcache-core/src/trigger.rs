//! Completion-triggered eviction.
//!
//! A [`CompletionTrigger`] is a one-shot notification raised when a cached
//! computation finishes. A store attaches an [`EvictionHook`] to it when it
//! inserts the entry holding that computation; the computation fires the
//! trigger once its result is available, and the hook drops the entry.
//!
//! Registration and firing may happen in either order. A hook registered
//! after the trigger fired runs immediately, so an entry is never left behind
//! because its computation finished before the store finished inserting it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;

/// Asynchronous callback run when a [`CompletionTrigger`] fires.
pub type EvictionHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

enum TriggerState {
    Pending(Vec<EvictionHook>),
    Fired,
}

/// One-shot notification that a computation has completed.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct CompletionTrigger {
    state: Arc<Mutex<TriggerState>>,
}

impl CompletionTrigger {
    /// Creates a trigger that has not fired yet.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TriggerState::Pending(Vec::new()))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` once [`fire`](Self::fire) has been called.
    pub fn has_fired(&self) -> bool {
        matches!(*self.lock(), TriggerState::Fired)
    }

    /// Attaches a hook, running it right away if the trigger already fired.
    pub async fn register(&self, hook: EvictionHook) {
        let hook = {
            let mut state = self.lock();
            match &mut *state {
                TriggerState::Pending(hooks) => {
                    hooks.push(hook);
                    None
                }
                TriggerState::Fired => Some(hook),
            }
        };
        if let Some(hook) = hook {
            hook().await;
        }
    }

    /// Fires the trigger, running every registered hook once.
    ///
    /// Subsequent calls do nothing.
    pub async fn fire(&self) {
        let hooks = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, TriggerState::Fired) {
                TriggerState::Pending(hooks) => hooks,
                TriggerState::Fired => Vec::new(),
            }
        };
        for hook in hooks {
            hook().await;
        }
    }
}

impl Default for CompletionTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (fired, hooks) = match &*self.lock() {
            TriggerState::Pending(hooks) => (false, hooks.len()),
            TriggerState::Fired => (true, 0),
        };
        f.debug_struct("CompletionTrigger")
            .field("fired", &fired)
            .field("hooks", &hooks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook(counter: &Arc<AtomicUsize>) -> EvictionHook {
        let counter = Arc::clone(counter);
        Box::new(move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn hooks_run_once_on_fire() {
        let trigger = CompletionTrigger::new();
        let counter = Arc::new(AtomicUsize::new(0));

        trigger.register(counting_hook(&counter)).await;
        trigger.register(counting_hook(&counter)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!trigger.has_fired());

        trigger.fire().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(trigger.has_fired());

        trigger.fire().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn late_registration_runs_immediately() {
        let trigger = CompletionTrigger::new();
        let counter = Arc::new(AtomicUsize::new(0));

        trigger.clone().fire().await;
        trigger.register(counting_hook(&counter)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
