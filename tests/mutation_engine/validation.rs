//! Pre-flight validation and its interaction with the compiled guards
//!
//! - Schema failures leave the store unchanged
//! - Duplicate creates fail with "already exists"
//! - Updates/deletes of missing records fail with "not found"
//! - Validation failures are batch-level but keep the failing intent
//! - With validation off, the compiled guard still blocks duplicates

use std::sync::Arc;

use kvorm::{key, Database, KvStore, Lookup, MemoryStore, Mutation, MutationError, Value};

use crate::common::*;

fn open() -> (MemoryStore, Database) {
    init_tracing();
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()));
    (store, db)
}

// ============================================================================
// CREATE
// ============================================================================

#[tokio::test]
async fn schema_failure_writes_nothing() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut batch = db.mutation();
    batch
        .sum(key!["counters", "users"], 1)
        .create(&users, json!({"id": "u1", "email": 42}));
    let result = batch.commit().await;

    assert!(!result.ok);
    let failed = result.failed_mutation.unwrap();
    assert!(matches!(
        failed.error.root_cause(),
        MutationError::Schema { entity, .. } if entity == "users"
    ));
    assert!(failed.error.to_string().contains("email"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn duplicate_create_keeps_first_record() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut first = db.mutation();
    first.create(&users, json!({"id": "u1", "email": "a@b.com"}));
    assert!(first.commit().await.ok);

    let mut second = db.mutation();
    second.create(&users, json!({"id": "u1", "email": "c@d.com"}));
    let result = second.commit().await;

    assert!(!result.ok);
    let message = result.error().unwrap().to_string();
    assert!(message.contains("already exists"), "{}", message);

    let stored = store.get(&key!["users", "u1"]).await.unwrap().unwrap();
    assert_eq!(stored.value.get("email"), Some(&Value::from("a@b.com")));
}

#[tokio::test]
async fn validation_failure_is_batch_level_but_names_intent() {
    let (_store, db) = open();
    let users = db.register(users()).unwrap();

    let mut seed = db.mutation();
    seed.create(&users, json!({"id": "u1", "email": "a@b.com"}));
    assert!(seed.commit().await.ok);

    let mut batch = db.mutation();
    batch
        .set(key!["audit", "1"], "ok")
        .create(&users, json!({"id": "u2", "email": "x@y.io"}))
        .create(&users, json!({"id": "u1", "email": "dup@y.io"}));
    let result = batch.commit().await;

    let failed = result.failed_mutation.unwrap();
    assert_eq!(failed.index, None);
    assert_eq!(failed.position(), Some(2));
    assert!(matches!(
        failed.mutation,
        Some(Mutation::Create { ref data, .. }) if data.get("id") == Some(&Value::from("u1"))
    ));
    assert_eq!(result.mutations.len(), 3);
    assert_eq!(result.attempts, 0);
}

#[tokio::test]
async fn compiled_guard_blocks_duplicate_without_validation() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut first = db.mutation();
    first.create(&users, json!({"id": "u1", "email": "a@b.com"}));
    assert!(first.commit().await.ok);
    let before = store.current_versionstamp();

    let mut second = db.mutation();
    second.create(&users, json!({"id": "u1", "email": "c@d.com"}));
    let result = second
        .commit_with(&fast_options().with_validation(false).with_max_retries(2))
        .await;

    assert!(!result.ok);
    assert!(result.is_conflict());
    assert_eq!(result.attempts, 3);
    assert_eq!(store.current_versionstamp(), before);
}

#[tokio::test]
async fn schema_failure_without_validation_is_pinned() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut batch = db.mutation();
    batch
        .sum(key!["n"], 1)
        .create(&users, json!({"id": "u1"}));
    let result = batch
        .commit_with(&fast_options().with_validation(false))
        .await;

    let failed = result.failed_mutation.unwrap();
    assert_eq!(failed.index, Some(1));
    assert!(matches!(failed.error, MutationError::Schema { .. }));
    assert!(store.is_empty());
}

// ============================================================================
// UPDATE / DELETE
// ============================================================================

#[tokio::test]
async fn update_and_delete_of_missing_record_fail() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut update = db.mutation();
    update.update(&users, "ghost", json!({"email": "g@h.io"}));
    let result = update.commit().await;
    assert!(!result.ok);
    assert!(result.error().unwrap().to_string().contains("not found"));

    let mut delete = db.mutation();
    delete.delete(&users, Lookup::index("email", "ghost@h.io"));
    let result = delete.commit().await;
    assert!(!result.ok);
    assert!(result.error().unwrap().to_string().contains("not found"));

    assert!(store.is_empty());
}

#[tokio::test]
async fn replace_must_satisfy_schema_on_its_own() {
    let (_store, db) = open();
    let users = db.register(users()).unwrap();

    let mut seed = db.mutation();
    seed.create(&users, json!({"id": "u1", "email": "a@b.com"}));
    assert!(seed.commit().await.ok);

    let mut merge = db.mutation();
    merge.update(&users, "u1", json!({"age": 30}));
    assert!(merge.commit().await.ok);

    let mut replace = db.mutation();
    replace.replace(&users, "u1", json!({"age": 31}));
    let result = replace.commit().await;
    assert!(matches!(
        result.error().map(MutationError::root_cause),
        Some(MutationError::Schema { .. })
    ));

    let record = db.find(&users, "u1").await.unwrap().unwrap();
    assert_eq!(record.value.get("age"), Some(&Value::Int(30)));
}

#[tokio::test]
async fn update_cannot_move_primary_key() {
    let (_store, db) = open();
    let users = db.register(users()).unwrap();

    let mut seed = db.mutation();
    seed.create(&users, json!({"id": "u1", "email": "a@b.com"}));
    assert!(seed.commit().await.ok);

    let mut rename = db.mutation();
    rename.update(&users, "u1", json!({"id": "u2"}));
    let result = rename.commit_with(&fast_options().with_validation(false)).await;
    assert!(matches!(
        result.error(),
        Some(MutationError::PrimaryKeyChanged { .. })
    ));
    assert!(db.find(&users, "u2").await.unwrap().is_none());
}
