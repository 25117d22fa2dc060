//! Counters and guarded helpers
//!
//! - Increment is exact, decrement clamps at zero
//! - Conditional increment is a no-op on mismatch
//! - Decrement re-reads when its guard goes stale
//! - transfer/swap/compose through the public API

use std::sync::Arc;

use kvorm::{
    compose, key, swap, transfer, Counter, Database, KvStore, MemoryStore, MutationError, Value,
};

use crate::common::*;

fn open() -> (MemoryStore, Database) {
    init_tracing();
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()));
    (store, db)
}

#[tokio::test]
async fn decrement_never_goes_negative() {
    let (_store, db) = open();
    let stock = db.counter(key!["stock", "widget"]);

    for n in [4u64, 1, 6] {
        assert!(stock.increment(n).await.ok);
    }
    assert_eq!(stock.value().await.unwrap(), 11);

    for (n, expected) in [(5u64, 6u64), (6, 0), (1, 0)] {
        let result = stock.decrement(n).await;
        assert!(result.ok, "{:?}", result.failed_mutation);
        assert_eq!(stock.value().await.unwrap(), expected);
    }
}

#[tokio::test]
async fn conditional_increment_on_mismatch_writes_nothing() {
    let (store, db) = open();
    let seats = db.counter(key!["seats"]);
    assert!(seats.increment(3).await.ok);
    let before = store.current_versionstamp();

    let result = seats.conditional_increment(2, 1).await;
    assert!(!result.ok);
    assert!(matches!(
        result.error(),
        Some(MutationError::ConditionNotMet {
            expected: 2,
            actual: 3,
            ..
        })
    ));
    assert_eq!(store.current_versionstamp(), before);

    assert!(seats.conditional_increment(3, 1).await.ok);
    assert_eq!(seats.value().await.unwrap(), 4);
}

#[tokio::test]
async fn decrement_rereads_after_stale_guard() {
    init_tracing();
    let inner = MemoryStore::new();
    inner
        .set(key!["stock"], Value::U64(10), kvorm::SetOptions::default())
        .await
        .unwrap();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::Touch(key!["stock"]), 2));
    let stock = Counter::new(store.clone(), key!["stock"]).with_options(fast_options());

    let result = stock.decrement(3).await;
    assert!(result.ok, "{:?}", result.failed_mutation);
    assert_eq!(result.attempts, 3);
    assert_eq!(store.commit_calls(), 3);
    assert_eq!(stock.value().await.unwrap(), 7);
}

#[tokio::test]
async fn decrement_gives_up_after_budget() {
    init_tracing();
    let inner = MemoryStore::new();
    inner
        .set(key!["stock"], Value::U64(10), kvorm::SetOptions::default())
        .await
        .unwrap();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::Touch(key!["stock"]), u32::MAX));
    let stock = Counter::new(store, key!["stock"])
        .with_options(fast_options().with_max_retries(2));

    let result = stock.decrement(3).await;
    assert!(!result.ok);
    assert_eq!(result.error(), Some(&MutationError::Conflict { attempts: 3 }));
    assert_eq!(
        inner.get(&key!["stock"]).await.unwrap().unwrap().value,
        Value::U64(10)
    );
}

#[tokio::test]
async fn transfer_between_accounts() {
    let (_store, db) = open();
    let alice = db.counter(key!["balance", "alice"]);
    let bob = db.counter(key!["balance", "bob"]);
    assert!(alice.increment(100).await.ok);

    let result = transfer(&alice, &bob, 30).await.unwrap();
    assert!(result.ok);
    assert_eq!(alice.value().await.unwrap(), 70);
    assert_eq!(bob.value().await.unwrap(), 30);

    let result = transfer(&bob, &alice, 31).await.unwrap();
    assert!(matches!(
        result.error(),
        Some(MutationError::InsufficientValue {
            available: 30,
            requested: 31,
            ..
        })
    ));
    assert_eq!(bob.value().await.unwrap(), 30);
}

#[tokio::test]
async fn swap_and_compose_through_database_builders() {
    let (store, db) = open();

    let mut left = db.mutation();
    left.set(key!["slot", "a"], "apple");
    let mut right = db.mutation();
    right.set(key!["slot", "b"], "banana");
    let combined = compose(&[&left, &right]).unwrap();
    assert_eq!(combined.len(), 2);
    assert!(combined.commit().await.ok);

    let coordinator = combined.coordinator().clone();
    let result = swap(
        &coordinator,
        &key!["slot", "a"],
        &key!["slot", "b"],
        &fast_options(),
    )
    .await
    .unwrap();
    assert!(result.ok);
    assert_eq!(
        store.get(&key!["slot", "a"]).await.unwrap().unwrap().value,
        Value::from("banana")
    );
    assert_eq!(
        store.get(&key!["slot", "b"]).await.unwrap().unwrap().value,
        Value::from("apple")
    );
}
