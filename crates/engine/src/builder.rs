//! Mutation builder
//!
//! Accumulates intents and commits them as one atomic transaction. The
//! builder is reusable: `commit` reads the intent list without consuming or
//! mutating it, so the same batch can be committed again after a failure.
//!
//! # Example
//!
//! ```ignore
//! let mut batch = MutationBuilder::new(store);
//! batch
//!     .create(&users, json!({"id": "u1", "email": "a@b.com"}))
//!     .sum(key!["counters", "users"], 1);
//! let result = batch.commit().await;
//! assert!(result.ok);
//! ```

use std::sync::Arc;
use std::time::Duration;

use kvorm_core::{Key, Value, Versionstamp};
use kvorm_model::{Entity, Registry};
use kvorm_storage::KvStore;

use crate::coordinator::CommitCoordinator;
use crate::mutation::{Lookup, Mutation};
use crate::options::CommitOptions;
use crate::result::TransactionResult;

/// Ordered list of intents plus the policy used to commit them
#[derive(Debug, Clone)]
pub struct MutationBuilder {
    coordinator: Arc<CommitCoordinator>,
    mutations: Vec<Mutation>,
    options: CommitOptions,
}

impl MutationBuilder {
    /// Empty builder committing to `store`
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_coordinator(Arc::new(CommitCoordinator::new(store)))
    }

    /// Empty builder sharing an existing coordinator
    pub fn with_coordinator(coordinator: Arc<CommitCoordinator>) -> Self {
        Self {
            coordinator,
            mutations: Vec::new(),
            options: CommitOptions::default(),
        }
    }

    /// Resolve cascade dependents through `registry`
    ///
    /// The builder keeps feeding its current coordinator's metrics.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.coordinator = Arc::new(self.coordinator.share_with_registry(registry));
        self
    }

    /// Default options for `commit()`
    pub fn with_options(mut self, options: CommitOptions) -> Self {
        self.options = options;
        self
    }

    /// Options `commit()` uses
    pub fn options(&self) -> &CommitOptions {
        &self.options
    }

    /// The coordinator this builder commits through
    pub fn coordinator(&self) -> &Arc<CommitCoordinator> {
        &self.coordinator
    }

    /// Append a prepared intent
    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    /// Append prepared intents in order
    pub fn extend(&mut self, mutations: impl IntoIterator<Item = Mutation>) -> &mut Self {
        self.mutations.extend(mutations);
        self
    }

    /// Insert a new record
    pub fn create(&mut self, entity: &Entity, data: impl Into<Value>) -> &mut Self {
        self.push(Mutation::Create {
            entity: Arc::clone(entity),
            data: data.into(),
        })
    }

    /// Shallow-merge `data` into an existing record
    pub fn update(&mut self, entity: &Entity, key: impl Into<Lookup>, data: impl Into<Value>) -> &mut Self {
        self.update_with(entity, key, data, true)
    }

    /// Replace an existing record's value with `data`
    pub fn replace(&mut self, entity: &Entity, key: impl Into<Lookup>, data: impl Into<Value>) -> &mut Self {
        self.update_with(entity, key, data, false)
    }

    /// Update with an explicit merge flag
    pub fn update_with(
        &mut self,
        entity: &Entity,
        key: impl Into<Lookup>,
        data: impl Into<Value>,
        merge: bool,
    ) -> &mut Self {
        self.push(Mutation::Update {
            entity: Arc::clone(entity),
            key: key.into(),
            data: data.into(),
            merge,
        })
    }

    /// Remove a record and its index entries
    pub fn delete(&mut self, entity: &Entity, key: impl Into<Lookup>) -> &mut Self {
        self.push(Mutation::Delete {
            entity: Arc::clone(entity),
            key: key.into(),
            cascade: false,
        })
    }

    /// Remove a record, its relation entries and its dependents
    pub fn delete_cascade(&mut self, entity: &Entity, key: impl Into<Lookup>) -> &mut Self {
        self.push(Mutation::Delete {
            entity: Arc::clone(entity),
            key: key.into(),
            cascade: true,
        })
    }

    /// Write a raw key
    pub fn set(&mut self, key: Key, value: impl Into<Value>) -> &mut Self {
        self.push(Mutation::Set {
            key,
            value: value.into(),
            expire_in: None,
        })
    }

    /// Write a raw key that expires after `expire_in`
    pub fn set_with_expiry(&mut self, key: Key, value: impl Into<Value>, expire_in: Duration) -> &mut Self {
        self.push(Mutation::Set {
            key,
            value: value.into(),
            expire_in: Some(expire_in),
        })
    }

    /// Require `key` to be at `versionstamp` (`None` = absent) at commit
    pub fn check(&mut self, key: Key, versionstamp: Option<Versionstamp>) -> &mut Self {
        self.push(Mutation::Check { key, versionstamp })
    }

    /// Add `value` to the unsigned counter at `key`
    pub fn sum(&mut self, key: Key, value: u64) -> &mut Self {
        self.push(Mutation::Sum { key, value })
    }

    /// Store the smaller of `value` and the current counter
    pub fn min(&mut self, key: Key, value: u64) -> &mut Self {
        self.push(Mutation::Min { key, value })
    }

    /// Store the larger of `value` and the current counter
    pub fn max(&mut self, key: Key, value: u64) -> &mut Self {
        self.push(Mutation::Max { key, value })
    }

    /// Copy of the recorded intents
    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.clone()
    }

    /// Number of recorded intents
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Whether no intent is recorded
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Drop every recorded intent
    pub fn clear(&mut self) -> &mut Self {
        self.mutations.clear();
        self
    }

    /// Commit with the builder's options
    pub async fn commit(&self) -> TransactionResult {
        self.commit_with(&self.options).await
    }

    /// Commit with explicit options
    pub async fn commit_with(&self, options: &CommitOptions) -> TransactionResult {
        self.coordinator.execute(self.mutations.clone(), options).await
    }
}
