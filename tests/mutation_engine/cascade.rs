//! Cascade deletes
//!
//! - ONE_TO_MANY with cascade removes dependent records and their entries
//! - MANY_TO_MANY removes join records referencing the deleted record
//! - Plain deletes leave dependents alone
//! - Composite-key owners link dependents through every key field

use std::sync::Arc;

use kvorm::{
    collect_list, key, Database, EntityDescriptor, KvStore, ListOptions, ListSelector, MemoryStore,
    Relation, RelationKind,
};

use crate::common::*;

async fn library() -> (MemoryStore, Database) {
    init_tracing();
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()));
    let authors = db.register(authors()).unwrap();
    let books = db.register(books()).unwrap();

    let mut seed = db.mutation();
    seed.create(&authors, json!({"id": "a1", "name": "Le Guin"}))
        .create(&authors, json!({"id": "a2", "name": "Herbert"}))
        .create(&books, json!({"id": "b1", "authors_id": "a1", "title": "Earthsea"}))
        .create(&books, json!({"id": "b2", "authors_id": "a1", "title": "Lathe"}))
        .create(&books, json!({"id": "b3", "authors_id": "a2", "title": "Dune"}));
    assert!(seed.commit().await.ok);
    (store, db)
}

async fn present(store: &MemoryStore, key: kvorm::Key) -> bool {
    store.get(&key).await.unwrap().is_some()
}

#[tokio::test]
async fn cascade_removes_dependents_of_one_author() {
    let (store, db) = library().await;
    let authors = db.entity("authors").unwrap();

    let mut delete = db.mutation();
    delete.delete_cascade(&authors, "a1");
    let result = delete.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);

    assert!(!present(&store, key!["authors", "a1"]).await);
    assert!(!present(&store, key!["books", "b1"]).await);
    assert!(!present(&store, key!["books", "b2"]).await);
    assert!(!present(&store, key!["books_rel_author", "a1", "b1"]).await);
    assert!(!present(&store, key!["authors_rel_books", "a1"]).await);

    assert!(present(&store, key!["authors", "a2"]).await);
    assert!(present(&store, key!["books", "b3"]).await);
    assert!(present(&store, key!["books_rel_author", "a2", "b3"]).await);
}

#[tokio::test]
async fn plain_delete_leaves_dependents() {
    let (store, db) = library().await;
    let authors = db.entity("authors").unwrap();

    let mut delete = db.mutation();
    delete.delete(&authors, "a1");
    assert!(delete.commit().await.ok);

    assert!(!present(&store, key!["authors", "a1"]).await);
    assert!(present(&store, key!["books", "b1"]).await);
    assert!(present(&store, key!["books_rel_author", "a1", "b1"]).await);
}

#[tokio::test]
async fn many_to_many_cascade_removes_join_records() {
    init_tracing();
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()));
    let students = db
        .register(
            EntityDescriptor::builder("students")
                .relation(
                    Relation::new("courses", "courses", RelationKind::ManyToMany)
                        .through("enrollments"),
                )
                .build()
                .unwrap(),
        )
        .unwrap();
    let enrollments = db
        .register(EntityDescriptor::builder("enrollments").build().unwrap())
        .unwrap();

    let mut seed = db.mutation();
    seed.create(&students, json!({"id": "s1"}))
        .create(&students, json!({"id": "s2"}))
        .create(&enrollments, json!({"id": "e1", "students_id": "s1", "courses_id": "c1"}))
        .create(&enrollments, json!({"id": "e2", "students_id": "s1", "courses_id": "c2"}))
        .create(&enrollments, json!({"id": "e3", "students_id": "s2", "courses_id": "c1"}));
    assert!(seed.commit().await.ok);

    let mut delete = db.mutation();
    delete.delete_cascade(&students, "s1");
    assert!(delete.commit().await.ok);

    let remaining = collect_list(
        &store,
        &ListSelector::Prefix(key!["enrollments"]),
        ListOptions::default(),
    )
    .await
    .unwrap();
    let ids: Vec<_> = remaining.iter().map(|e| e.key.clone()).collect();
    assert_eq!(ids, vec![key!["enrollments", "e3"]]);
}

#[tokio::test]
async fn cascade_of_unregistered_dependent_still_deletes_record() {
    init_tracing();
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()));
    let authors = db.register(authors()).unwrap();

    let mut seed = db.mutation();
    seed.create(&authors, json!({"id": "a1"}));
    assert!(seed.commit().await.ok);

    let mut delete = db.mutation();
    delete.delete_cascade(&authors, "a1");
    assert!(delete.commit().await.ok);
    assert!(store.is_empty());
}

#[tokio::test]
async fn cascade_from_composite_key_owner() {
    init_tracing();
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()));
    let members = db.register(members()).unwrap();
    let badges = db.register(badges()).unwrap();

    let mut seed = db.mutation();
    seed.create(&members, json!({"org": "acme", "user": "bob", "email": "b@acme"}))
        .create(&members, json!({"org": "acme", "user": "eve", "email": "e@acme"}))
        .create(&badges, json!({"id": "x1", "members_org": "acme", "members_user": "bob"}))
        .create(&badges, json!({"id": "x2", "members_org": "acme", "members_user": "bob"}))
        .create(&badges, json!({"id": "x3", "members_org": "acme", "members_user": "eve"}));
    assert!(seed.commit().await.ok);

    assert_eq!(
        store
            .get(&key!["badges_rel_member", "acme", "bob", "x1"])
            .await
            .unwrap()
            .map(|entry| entry.value),
        Some(kvorm::Value::from("x1"))
    );

    let mut delete = db.mutation();
    delete.delete_cascade(&members, kvorm::Lookup::index("email", "b@acme"));
    let result = delete.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);

    assert!(!present(&store, key!["members", "acme", "bob"]).await);
    assert!(!present(&store, key!["members_rel_badges", "acme", "bob"]).await);
    assert!(!present(&store, key!["badges", "x1"]).await);
    assert!(!present(&store, key!["badges", "x2"]).await);
    assert!(!present(&store, key!["badges_rel_member", "acme", "bob", "x1"]).await);

    assert!(present(&store, key!["members", "acme", "eve"]).await);
    assert!(present(&store, key!["badges", "x3"]).await);
    assert!(present(&store, key!["badges_rel_member", "acme", "eve", "x3"]).await);
}
