//! Derived secondary-index maintenance
//!
//! - REFERENCE entries hold the designated field, COPY entries the record
//! - Composite keys are referenced by their key tuple
//! - Designated-field and composite-key indexes resolve UPDATE and DELETE
//! - Updates move and refresh entries for both modes
//! - Index keys are unique: a taken key fails the commit
//! - Deletes remove every entry the record owned

use std::sync::Arc;

use kvorm::{key, Database, KvStore, Lookup, MemoryStore, Value};

use crate::common::*;

fn open() -> (MemoryStore, Database) {
    init_tracing();
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()));
    (store, db)
}

async fn read(store: &MemoryStore, key: kvorm::Key) -> Option<Value> {
    store.get(&key).await.unwrap().map(|entry| entry.value)
}

#[tokio::test]
async fn reference_and_copy_entries_after_create() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut batch = db.mutation();
    batch.create(&users, json!({"id": "u1", "email": "a@b.com", "handle": "ann"}));
    assert!(batch.commit().await.ok);

    assert_eq!(
        read(&store, key!["users_by_email", "a@b.com"]).await,
        Some(Value::from("u1"))
    );
    assert_eq!(
        read(&store, key!["users_by_handle", "ann"]).await,
        Some(Value::from(
            json!({"id": "u1", "email": "a@b.com", "handle": "ann", "active": true})
        ))
    );
}

#[tokio::test]
async fn reference_index_with_designated_field() {
    let (store, db) = open();
    let accounts = db.register(accounts()).unwrap();

    let mut batch = db.mutation();
    batch
        .create(&accounts, json!({"id": 7, "login": "root", "display": "Admin"}))
        .create(&accounts, json!({"id": 8, "login": "guest", "display": "Admin"}));
    assert!(batch.commit().await.ok);

    assert_eq!(
        read(&store, key!["accounts_by_login", "root"]).await,
        Some(Value::from("Admin"))
    );
    let found = db
        .find(&accounts, Lookup::index("by_login", "root"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.key, key!["accounts", 7]);
}

#[tokio::test]
async fn update_and_delete_through_designated_field_index() {
    let (store, db) = open();
    let accounts = db.register(accounts()).unwrap();

    let mut seed = db.mutation();
    seed.create(&accounts, json!({"id": 7, "login": "root", "display": "Admin"}));
    assert!(seed.commit().await.ok);

    let mut update = db.mutation();
    update.update(&accounts, Lookup::index("by_login", "root"), json!({"display": "Root"}));
    let result = update.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);

    let record = read(&store, key!["accounts", 7]).await.unwrap();
    assert_eq!(record.get("display"), Some(&Value::from("Root")));
    assert_eq!(
        read(&store, key!["accounts_by_login", "root"]).await,
        Some(Value::from("Root"))
    );

    let mut delete = db.mutation();
    delete.delete(&accounts, Lookup::index("by_login", "root"));
    let result = delete.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);
    assert!(store.is_empty());
}

#[tokio::test]
async fn composite_key_index_stores_key_tuple() {
    let (store, db) = open();
    let members = db.register(members()).unwrap();

    let mut seed = db.mutation();
    seed.create(&members, json!({"org": "acme", "user": "bob", "email": "b@acme"}))
        .create(&members, json!({"org": "acme", "user": "eve", "email": "e@acme"}));
    assert!(seed.commit().await.ok);

    assert_eq!(
        read(&store, key!["members_by_email", "b@acme"]).await,
        Some(Value::from(json!(["acme", "bob"])))
    );

    let mut update = db.mutation();
    update.update(&members, Lookup::index("email", "b@acme"), json!({"role": "admin"}));
    let result = update.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);
    let bob = read(&store, key!["members", "acme", "bob"]).await.unwrap();
    assert_eq!(bob.get("role"), Some(&Value::from("admin")));

    let mut delete = db.mutation();
    delete.delete(&members, Lookup::index("email", "b@acme"));
    let result = delete.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);

    assert_eq!(read(&store, key!["members", "acme", "bob"]).await, None);
    assert_eq!(read(&store, key!["members_by_email", "b@acme"]).await, None);
    assert!(read(&store, key!["members", "acme", "eve"]).await.is_some());
}

#[tokio::test]
async fn update_moves_reference_entry_and_refreshes_copy() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut seed = db.mutation();
    seed.create(&users, json!({"id": "u1", "email": "a@b.com", "handle": "ann"}));
    assert!(seed.commit().await.ok);

    let mut update = db.mutation();
    update.update(&users, Lookup::index("email", "a@b.com"), json!({"email": "c@d.com", "age": 9}));
    let result = update.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);

    assert_eq!(read(&store, key!["users_by_email", "a@b.com"]).await, None);
    assert_eq!(
        read(&store, key!["users_by_email", "c@d.com"]).await,
        Some(Value::from("u1"))
    );
    let copy = read(&store, key!["users_by_handle", "ann"]).await.unwrap();
    assert_eq!(copy.get("email"), Some(&Value::from("c@d.com")));
    assert_eq!(copy.get("age"), Some(&Value::Int(9)));
}

#[tokio::test]
async fn taken_index_key_fails_the_whole_batch() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut seed = db.mutation();
    seed.create(&users, json!({"id": "u1", "email": "a@b.com"}));
    assert!(seed.commit().await.ok);
    let before = store.current_versionstamp();

    let mut batch = db.mutation();
    batch
        .sum(key!["counters", "users"], 1)
        .create(&users, json!({"id": "u2", "email": "a@b.com"}));
    let result = batch.commit_with(&fast_options().with_max_retries(0)).await;

    assert!(!result.ok);
    assert!(result.is_conflict());
    assert_eq!(store.current_versionstamp(), before);
    assert!(db.find(&users, "u2").await.unwrap().is_none());
}

#[tokio::test]
async fn records_without_indexed_field_are_not_indexed() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut batch = db.mutation();
    batch
        .create(&users, json!({"id": "u1", "email": "a@b.com"}))
        .create(&users, json!({"id": "u2", "email": "b@b.com"}));
    assert!(batch.commit().await.ok);

    let handles = kvorm::collect_list(
        &store,
        &kvorm::ListSelector::Prefix(key!["users_by_handle"]),
        kvorm::ListOptions::default(),
    )
    .await
    .unwrap();
    assert!(handles.is_empty());
}

#[tokio::test]
async fn delete_removes_owned_entries() {
    let (store, db) = open();
    let users = db.register(users()).unwrap();

    let mut seed = db.mutation();
    seed.create(&users, json!({"id": "u1", "email": "a@b.com", "handle": "ann"}));
    assert!(seed.commit().await.ok);

    let mut delete = db.mutation();
    delete.delete(&users, Lookup::index("handle", "ann"));
    assert!(delete.commit().await.ok);

    assert!(store.is_empty());
}
