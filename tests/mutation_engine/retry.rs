//! Retry and timeout policy
//!
//! - Rejected commits retry up to `max_retries`, then report a conflict
//! - Transient store errors are retried; permanent ones are not
//! - Every retry recompiles against fresh reads
//! - A timed-out commit is reported as unknown and never retried

use std::sync::Arc;
use std::time::Duration;

use kvorm::{
    key, CommitCoordinator, Database, Error, KvStore, MemoryStore, MutationBuilder, MutationError,
    Operation, Value,
};

use crate::common::*;

fn builder(store: &Arc<FaultyStore>) -> MutationBuilder {
    init_tracing();
    MutationBuilder::new(Arc::clone(store) as Arc<dyn KvStore>).with_options(fast_options())
}

#[tokio::test]
async fn conflict_exhausts_retry_budget() {
    let store = Arc::new(FaultyStore::always_rejecting(MemoryStore::new()));
    let mut batch = builder(&store);
    batch.sum(key!["n"], 1);

    let result = batch.commit().await;
    assert!(!result.ok);
    assert_eq!(result.attempts, 4);
    assert_eq!(result.error(), Some(&MutationError::Conflict { attempts: 4 }));
    assert_eq!(store.commit_calls(), 4);
}

#[tokio::test]
async fn retry_disabled_makes_one_attempt() {
    let store = Arc::new(FaultyStore::always_rejecting(MemoryStore::new()));
    let mut batch = builder(&store);
    batch.sum(key!["n"], 1);

    let result = batch.commit_with(&fast_options().with_retry(false)).await;
    assert_eq!(result.attempts, 1);
    assert!(result.is_conflict());
    assert_eq!(store.commit_calls(), 1);
}

#[tokio::test]
async fn transient_outage_is_retried() {
    let inner = MemoryStore::new();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::Unavailable, 2));
    let mut batch = builder(&store);
    batch.sum(key!["n"], 3);

    let result = batch.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);
    assert_eq!(result.attempts, 3);
    assert_eq!(
        inner.get(&key!["n"]).await.unwrap().unwrap().value,
        Value::U64(3)
    );
}

#[tokio::test]
async fn outage_outlasting_budget_reports_store_error() {
    let store = Arc::new(FaultyStore::new(MemoryStore::new(), Fault::Unavailable, u32::MAX));
    let mut batch = builder(&store);
    batch.sum(key!["n"], 3);

    let result = batch.commit_with(&fast_options().with_max_retries(1)).await;
    assert_eq!(result.attempts, 2);
    assert!(matches!(
        result.error(),
        Some(MutationError::Store(Error::Unavailable(_)))
    ));
}

#[tokio::test]
async fn closed_store_is_not_retried() {
    let inner = MemoryStore::new();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::Reject, 0));
    inner.close();
    let mut batch = builder(&store);
    batch.sum(key!["n"], 1);

    let result = batch.commit().await;
    assert_eq!(result.attempts, 1);
    assert!(matches!(result.error(), Some(MutationError::Store(Error::Closed))));
}

#[tokio::test]
async fn retry_recompiles_update_against_fresh_versionstamp() {
    let inner = MemoryStore::new();
    let users = users();
    let seed = CommitCoordinator::new(Arc::new(inner.clone()));
    let mut create = MutationBuilder::with_coordinator(Arc::new(seed));
    create.create(&users, json!({"id": "u1", "email": "a@b.com"}));
    assert!(create.commit().await.ok);

    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::Touch(key!["users", "u1"]), 1));
    let mut update = builder(&store);
    update.update(&users, "u1", json!({"age": 5}));
    let result = update.commit().await;

    assert!(result.ok, "{:?}", result.failed_mutation);
    assert_eq!(result.attempts, 2);

    let guard = |op: &kvorm::AtomicOperation| {
        op.checks()
            .iter()
            .find(|c| c.key == key!["users", "u1"])
            .and_then(|c| c.versionstamp)
    };
    let seen = store.seen();
    assert_eq!(seen.len(), 2);
    assert!(guard(&seen[1]) > guard(&seen[0]));
    assert!(seen[1]
        .operations()
        .iter()
        .any(|op| matches!(op, Operation::Set { key, .. } if *key == key!["users", "u1"])));

    let stored = inner.get(&key!["users", "u1"]).await.unwrap().unwrap();
    assert_eq!(stored.value.get("age"), Some(&Value::Int(5)));
}

#[tokio::test]
async fn timed_out_commit_is_not_retried() {
    let store = Arc::new(FaultyStore::new(
        MemoryStore::new(),
        Fault::Delay(Duration::from_millis(500)),
        u32::MAX,
    ));
    let mut batch = builder(&store);
    batch.sum(key!["n"], 1);

    let result = batch
        .commit_with(&fast_options().with_timeout(Duration::from_millis(20)))
        .await;

    assert!(!result.ok);
    assert_eq!(result.attempts, 1);
    assert!(matches!(result.error(), Some(MutationError::Timeout { .. })));
    assert!(result.error().unwrap().to_string().contains("unknown"));
    assert_eq!(store.commit_calls(), 1);
}

#[tokio::test]
async fn commit_within_deadline_succeeds() {
    let store = Arc::new(FaultyStore::new(
        MemoryStore::new(),
        Fault::Delay(Duration::from_millis(5)),
        1,
    ));
    let mut batch = builder(&store);
    batch.sum(key!["n"], 1);

    let result = batch
        .commit_with(&fast_options().with_timeout(Duration::from_secs(5)))
        .await;
    assert!(result.ok);
}

#[tokio::test]
async fn configured_retry_policy_flows_from_database() {
    init_tracing();
    let config = kvorm::EngineConfig::from_toml_str(
        "[commit]\nmax_retries = 1\nretry_delay_ms = 0\n",
    )
    .unwrap();
    let store = Arc::new(FaultyStore::always_rejecting(MemoryStore::new()));
    let db = Database::open_with_config(store.clone(), config).unwrap();

    let mut batch = db.mutation();
    batch.sum(key!["n"], 1);
    let result = batch.commit().await;
    assert_eq!(result.attempts, 2);
    assert_eq!(db.metrics().retries, 1);
    assert_eq!(db.metrics().aborted, 1);
}
