//! Tests for the dashmap-backed store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskcache_backend::{DeleteStatus, InsertOptions, MemoryStore, Store, StoreError};
use taskcache_core::{CacheKey, CompletionTrigger, Expiration};

fn key(name: &str) -> CacheKey {
    CacheKey::new(name).unwrap()
}

fn expiring(ttl: Option<u64>, idle: Option<u64>) -> InsertOptions {
    InsertOptions::new(Expiration {
        time_to_live: ttl.map(Duration::from_secs),
        time_to_idle: idle.map(Duration::from_secs),
    })
}

#[tokio::test]
async fn init_runs_only_for_the_first_insert() {
    let store = MemoryStore::new();
    let calls = AtomicUsize::new(0);

    let first = store
        .get_or_insert_with(
            &key("a"),
            Box::new(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                1
            }),
            InsertOptions::default(),
        )
        .await
        .unwrap();
    let second = store
        .get_or_insert_with(
            &key("a"),
            Box::new(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                2
            }),
            InsertOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!((first, second), (1, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get(&key("a")).await.unwrap(), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_agree_on_one_value() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let tasks = (0..32).map(|i| {
        let store = store.clone();
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            store
                .get_or_insert_with(
                    &key("shared"),
                    Box::new(move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        i
                    }),
                    InsertOptions::default(),
                )
                .await
                .unwrap()
        })
    });
    let values: Vec<usize> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| *v == values[0]));
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_time_to_live() {
    let store = MemoryStore::new();
    store
        .get_or_insert_with(&key("ttl"), Box::new(|| "v"), expiring(Some(10), None))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(9)).await;
    assert_eq!(store.get(&key("ttl")).await.unwrap(), Some("v"));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(store.get(&key("ttl")).await.unwrap(), None);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reads_extend_sliding_expiration() {
    let store = MemoryStore::new();
    store
        .get_or_insert_with(&key("idle"), Box::new(|| 1), expiring(Some(20), Some(5)))
        .await
        .unwrap();

    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get(&key("idle")).await.unwrap(), Some(1));
    }

    // Idle for longer than the sliding window.
    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(store.get(&key("idle")).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn sliding_expiration_never_outlives_time_to_live() {
    let store = MemoryStore::new();
    store
        .get_or_insert_with(&key("capped"), Box::new(|| 1), expiring(Some(6), Some(4)))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(store.get(&key("capped")).await.unwrap(), Some(1));
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(store.get(&key("capped")).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_replaced_on_insert() {
    let store = MemoryStore::new();
    store
        .get_or_insert_with(&key("k"), Box::new(|| 1), expiring(Some(1), None))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let value = store
        .get_or_insert_with(&key("k"), Box::new(|| 2), InsertOptions::default())
        .await
        .unwrap();
    assert_eq!(value, 2);
}

#[tokio::test(start_paused = true)]
async fn purge_drops_expired_entries() {
    let store = MemoryStore::new();
    store
        .get_or_insert_with(&key("short"), Box::new(|| 1), expiring(Some(1), None))
        .await
        .unwrap();
    store
        .get_or_insert_with(&key("long"), Box::new(|| 2), InsertOptions::default())
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(store.len(), 2);
    store.purge_expired();
    assert_eq!(store.len(), 1);
    assert_eq!(store.keys().await.unwrap(), vec![key("long")]);
}

#[tokio::test]
async fn remove_if_checks_the_current_value() {
    let store = MemoryStore::new();
    store
        .get_or_insert_with(&key("k"), Box::new(|| 7), InsertOptions::default())
        .await
        .unwrap();

    let status = store.remove_if(&key("k"), &|v| *v == 8).await.unwrap();
    assert_eq!(status, DeleteStatus::Missing);
    assert_eq!(store.get(&key("k")).await.unwrap(), Some(7));

    let status = store.remove_if(&key("k"), &|v| *v == 7).await.unwrap();
    assert_eq!(status, DeleteStatus::Deleted);
    assert_eq!(store.get(&key("k")).await.unwrap(), None);

    assert_eq!(store.remove(&key("k")).await.unwrap(), DeleteStatus::Missing);
}

#[tokio::test]
async fn trigger_evicts_the_inserted_entry() {
    let store = MemoryStore::new();
    let trigger = CompletionTrigger::new();
    store
        .get_or_insert_with(
            &key("k"),
            Box::new(|| 1),
            InsertOptions::default().with_trigger(trigger.clone()),
        )
        .await
        .unwrap();
    assert_eq!(store.get(&key("k")).await.unwrap(), Some(1));

    trigger.fire().await;
    assert_eq!(store.get(&key("k")).await.unwrap(), None);
}

#[tokio::test]
async fn any_attached_trigger_evicts_the_entry() {
    let store = MemoryStore::new();
    let on_success = CompletionTrigger::new();
    let on_failure = CompletionTrigger::new();
    store
        .get_or_insert_with(
            &key("k"),
            Box::new(|| 1),
            InsertOptions::default()
                .with_trigger(on_success.clone())
                .with_trigger(on_failure.clone()),
        )
        .await
        .unwrap();

    on_failure.fire().await;
    assert_eq!(store.get(&key("k")).await.unwrap(), None);
    assert!(!on_success.has_fired());
}

#[tokio::test]
async fn trigger_fired_before_insert_evicts_immediately() {
    let store = MemoryStore::new();
    let trigger = CompletionTrigger::new();
    trigger.fire().await;

    let value = store
        .get_or_insert_with(
            &key("k"),
            Box::new(|| 1),
            InsertOptions::default().with_trigger(trigger),
        )
        .await
        .unwrap();
    assert_eq!(value, 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn stale_trigger_leaves_successor_alone() {
    let store = MemoryStore::new();
    let first = CompletionTrigger::new();
    store
        .get_or_insert_with(
            &key("k"),
            Box::new(|| 1),
            InsertOptions::default().with_trigger(first.clone()),
        )
        .await
        .unwrap();
    store.remove(&key("k")).await.unwrap();
    store
        .get_or_insert_with(&key("k"), Box::new(|| 2), InsertOptions::default())
        .await
        .unwrap();

    first.fire().await;
    assert_eq!(store.get(&key("k")).await.unwrap(), Some(2));
}

#[tokio::test]
async fn trigger_is_ignored_when_joining_an_entry() {
    let store = MemoryStore::new();
    store
        .get_or_insert_with(&key("k"), Box::new(|| 1), InsertOptions::default())
        .await
        .unwrap();

    let trigger = CompletionTrigger::new();
    store
        .get_or_insert_with(
            &key("k"),
            Box::new(|| 2),
            InsertOptions::default().with_trigger(trigger.clone()),
        )
        .await
        .unwrap();
    trigger.fire().await;

    assert_eq!(store.get(&key("k")).await.unwrap(), Some(1));
}

#[tokio::test]
async fn keys_are_a_detached_snapshot() {
    let store = MemoryStore::new();
    for name in ["a", "b", "c"] {
        store
            .get_or_insert_with(&key(name), Box::new(|| 0), InsertOptions::default())
            .await
            .unwrap();
    }

    let mut keys = store.keys().await.unwrap();
    for k in &keys {
        store.remove(k).await.unwrap();
    }
    keys.sort();

    assert_eq!(keys, vec![key("a"), key("b"), key("c")]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn closed_store_rejects_operations() {
    let store = MemoryStore::<u8>::new();
    store
        .get_or_insert_with(&key("k"), Box::new(|| 1), InsertOptions::default())
        .await
        .unwrap();
    store.close();

    assert!(store.is_closed());
    assert!(store.is_empty());
    assert!(matches!(
        store.get(&key("k")).await,
        Err(StoreError::Closed)
    ));
    assert!(matches!(
        store
            .get_or_insert_with(&key("k"), Box::new(|| 1), InsertOptions::default())
            .await,
        Err(StoreError::Closed)
    ));
    assert!(matches!(store.keys().await, Err(StoreError::Closed)));
}

#[tokio::test]
async fn shared_store_behind_arc() {
    let store = Arc::new(MemoryStore::with_label("shared"));
    store
        .get_or_insert_with(&key("k"), Box::new(|| 1), InsertOptions::default())
        .await
        .unwrap();

    assert_eq!(Store::<i32>::label(&store).as_str(), "shared");
    assert_eq!(Store::get(&store, &key("k")).await.unwrap(), Some(1));
}
