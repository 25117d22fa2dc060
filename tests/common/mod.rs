//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's
//! main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use kvorm::{
    AtomicOperation, CommitOptions, CommitOutcome, Entity, EntityDescriptor, Entry, Error,
    FieldType, Key, KvStore, Limits, ListOptions, ListPage, ListSelector, MemoryStore,
    KeySchema, ObjectSchema, Relation, RelationKind, SecondaryIndex, SetOptions, StorageMode,
    WatchStream,
};
use parking_lot::Mutex;

pub use serde_json::json;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route engine logs through the test writer (RUST_LOG-style filter).
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("kvorm=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Default options without the retry delay.
pub fn fast_options() -> CommitOptions {
    CommitOptions::new().with_retry_delay(Duration::ZERO)
}

// ============================================================================
// Entities
// ============================================================================

/// `users`: id + email required, `email` REFERENCE index, `handle` COPY index.
pub fn users() -> Entity {
    EntityDescriptor::builder("users")
        .index_on("email", ["email"], StorageMode::Reference)
        .index_on("handle", ["handle"], StorageMode::Copy)
        .validator(
            ObjectSchema::new()
                .required("id", FieldType::String)
                .required("email", FieldType::String)
                .optional("handle", FieldType::String)
                .optional("age", FieldType::Int)
                .with_default("active", FieldType::Bool, true),
        )
        .build()
        .expect("users descriptor")
}

/// `authors` with a cascading ONE_TO_MANY to `books`.
pub fn authors() -> Entity {
    EntityDescriptor::builder("authors")
        .relation(Relation::new("books", "books", RelationKind::OneToMany).cascading())
        .build()
        .expect("authors descriptor")
}

/// `books` with a MANY_TO_ONE back to `authors` on `authors_id`.
pub fn books() -> Entity {
    EntityDescriptor::builder("books")
        .relation(
            Relation::new("author", "authors", RelationKind::ManyToOne)
                .with_local_fields(["authors_id"]),
        )
        .build()
        .expect("books descriptor")
}

/// `accounts`: REFERENCE index `by_login` storing the `display` field.
pub fn accounts() -> Entity {
    EntityDescriptor::builder("accounts")
        .index(
            SecondaryIndex::new(
                "by_login",
                KeySchema::new().literal("accounts_by_login").field("login"),
                StorageMode::Reference,
            )
            .with_reference_field("display"),
        )
        .build()
        .expect("accounts descriptor")
}

/// `members` keyed `[members, org, user]`, `email` REFERENCE index and a
/// cascading ONE_TO_MANY to `badges`.
pub fn members() -> Entity {
    EntityDescriptor::builder("members")
        .primary_key(KeySchema::new().literal("members").field("org").field("user"))
        .index_on("email", ["email"], StorageMode::Reference)
        .relation(Relation::new("badges", "badges", RelationKind::OneToMany).cascading())
        .build()
        .expect("members descriptor")
}

/// `badges` with a MANY_TO_ONE back to `members` on both key fields.
pub fn badges() -> Entity {
    EntityDescriptor::builder("badges")
        .relation(
            Relation::new("member", "members", RelationKind::ManyToOne)
                .with_foreign_keys(["members_org", "members_user"]),
        )
        .build()
        .expect("badges descriptor")
}

// ============================================================================
// Fault-injecting stores
// ============================================================================

/// Store wrapper that injects failures into `commit`.
///
/// Reads pass through to the inner `MemoryStore` untouched.
pub struct FaultyStore {
    inner: MemoryStore,
    fault: Fault,
    remaining: AtomicU32,
    commits: AtomicU32,
    seen: Mutex<Vec<AtomicOperation>>,
}

/// Which failure a [`FaultyStore`] injects.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer `Rejected` without applying the operation
    Reject,
    /// Fail with a transient `Unavailable` error
    Unavailable,
    /// Sleep before committing
    Delay(Duration),
    /// Rewrite `key` with its current value just before committing, so any
    /// guard on it goes stale
    Touch(Key),
}

impl FaultyStore {
    /// Inject `fault` into the first `times` commits.
    pub fn new(inner: MemoryStore, fault: Fault, times: u32) -> Self {
        Self {
            inner,
            fault,
            remaining: AtomicU32::new(times),
            commits: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Reject every commit.
    pub fn always_rejecting(inner: MemoryStore) -> Self {
        Self::new(inner, Fault::Reject, u32::MAX)
    }

    /// Number of commit calls received.
    pub fn commit_calls(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Every operation passed to `commit`, in order.
    pub fn seen(&self) -> Vec<AtomicOperation> {
        self.seen.lock().clone()
    }

    fn take_fault(&self) -> Option<Fault> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| self.fault.clone())
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get(&self, key: &Key) -> kvorm::Result<Option<Entry>> {
        self.inner.get(key).await
    }

    async fn list(&self, selector: &ListSelector, options: &ListOptions) -> kvorm::Result<ListPage> {
        self.inner.list(selector, options).await
    }

    async fn commit(&self, operation: AtomicOperation) -> kvorm::Result<CommitOutcome> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(operation.clone());
        match self.take_fault() {
            Some(Fault::Reject) => Ok(CommitOutcome::Rejected),
            Some(Fault::Unavailable) => Err(Error::unavailable("injected outage")),
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                self.inner.commit(operation).await
            }
            Some(Fault::Touch(key)) => {
                if let Some(entry) = self.inner.get(&key).await? {
                    self.inner.set(key, entry.value, SetOptions::default()).await?;
                }
                self.inner.commit(operation).await
            }
            None => self.inner.commit(operation).await,
        }
    }

    async fn watch(&self, keys: Vec<Key>) -> kvorm::Result<Box<dyn WatchStream>> {
        self.inner.watch(keys).await
    }

    fn limits(&self) -> &Limits {
        self.inner.limits()
    }

    fn close(&self) {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
