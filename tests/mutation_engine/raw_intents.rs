//! Raw intents parsed at the serde edge

use std::sync::Arc;

use kvorm::{key, Database, KvStore, MemoryStore, Mutation, MutationError, RawMutation, Value};

use crate::common::*;

fn parse(input: serde_json::Value) -> Result<Vec<Mutation>, MutationError> {
    let raw: Vec<RawMutation> = serde_json::from_value(input).expect("well-formed JSON");
    raw.into_iter().map(Mutation::try_from).collect()
}

#[tokio::test]
async fn parsed_batch_commits_like_built_one() {
    init_tracing();
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()));

    let intents = parse(json!([
        {"type": "put", "key": ["config", "mode"], "value": "fast"},
        {"type": "increment", "key": ["counters", "views"], "value": 5},
        {"type": "maximum", "key": ["counters", "views"], "value": 3},
        {"type": "guard", "key": ["locks", "boot"]}
    ]))
    .unwrap();

    let mut batch = db.mutation();
    batch.extend(intents);
    let result = batch.commit().await;
    assert!(result.ok, "{:?}", result.failed_mutation);

    assert_eq!(
        store.get(&key!["config", "mode"]).await.unwrap().unwrap().value,
        Value::from("fast")
    );
    assert_eq!(
        store.get(&key!["counters", "views"]).await.unwrap().unwrap().value,
        Value::U64(5)
    );
}

#[test]
fn entity_intents_cannot_be_parsed_raw() {
    let err = parse(json!([{"type": "insert", "key": ["users", "u1"], "value": {}}])).unwrap_err();
    assert!(matches!(err, MutationError::Malformed(_)));
}

#[test]
fn unknown_tag_is_rejected() {
    let err = parse(json!([{"type": "explode", "key": ["k"]}])).unwrap_err();
    assert!(err.to_string().contains("explode"));
}
