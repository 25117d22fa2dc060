//! Unsigned counters over one raw key
//!
//! Increment is a native SUM and needs no guard: addition commutes. A
//! decrement clamps at zero, which does not commute, so it reads the current
//! value and commits CHECK + SET against the versionstamp it read.

use std::sync::Arc;

use kvorm_core::{Error, Key, Value, Versionstamp};
use kvorm_storage::KvStore;

use crate::coordinator::CommitCoordinator;
use crate::error::{MutationError, MutationResult};
use crate::helpers::{failed_before_commit, retry_guarded};
use crate::mutation::Mutation;
use crate::options::CommitOptions;
use crate::result::TransactionResult;

/// Counter value with the versionstamp it was read at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CounterRead {
    pub(crate) value: u64,
    /// `None` when the key is absent
    pub(crate) versionstamp: Option<Versionstamp>,
}

/// Read a counter; an absent key reads as zero
pub(crate) async fn read_counter(store: &dyn KvStore, key: &Key) -> MutationResult<CounterRead> {
    let Some(entry) = store.get(key).await? else {
        return Ok(CounterRead {
            value: 0,
            versionstamp: None,
        });
    };
    let value = match entry.value {
        Value::U64(n) => n,
        Value::Int(n) if n >= 0 => n as u64,
        other => {
            return Err(Error::TypeMismatch {
                expected: "u64",
                actual: other.type_name(),
            }
            .into())
        }
    };
    Ok(CounterRead {
        value,
        versionstamp: Some(entry.versionstamp),
    })
}

/// Handle on one counter key
#[derive(Debug, Clone)]
pub struct Counter {
    coordinator: Arc<CommitCoordinator>,
    key: Key,
    options: CommitOptions,
}

impl Counter {
    /// Counter at `key` in `store`
    pub fn new(store: Arc<dyn KvStore>, key: Key) -> Self {
        Self::with_coordinator(Arc::new(CommitCoordinator::new(store)), key)
    }

    /// Counter committing through a shared coordinator
    pub fn with_coordinator(coordinator: Arc<CommitCoordinator>, key: Key) -> Self {
        Self {
            coordinator,
            key,
            options: CommitOptions::default(),
        }
    }

    /// Options used for every commit, including the re-read budget of
    /// guarded operations
    pub fn with_options(mut self, options: CommitOptions) -> Self {
        self.options = options;
        self
    }

    /// Counter key
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Commit options
    pub fn options(&self) -> &CommitOptions {
        &self.options
    }

    pub(crate) fn coordinator(&self) -> &Arc<CommitCoordinator> {
        &self.coordinator
    }

    /// Current value; zero when the key is absent
    pub async fn value(&self) -> MutationResult<u64> {
        Ok(read_counter(self.coordinator.store().as_ref(), &self.key).await?.value)
    }

    /// Add `n` with a native SUM
    pub async fn increment(&self, n: u64) -> TransactionResult {
        let mutation = Mutation::Sum {
            key: self.key.clone(),
            value: n,
        };
        self.coordinator.execute(vec![mutation], &self.options).await
    }

    /// Subtract `n`, clamping at zero
    pub async fn decrement(&self, n: u64) -> TransactionResult {
        let this = self;
        retry_guarded(&self.options, move |options| async move {
            let current = match read_counter(this.coordinator.store().as_ref(), &this.key).await {
                Ok(current) => current,
                Err(e) => return failed_before_commit(Vec::new(), e),
            };
            let mutations = vec![
                Mutation::Check {
                    key: this.key.clone(),
                    versionstamp: current.versionstamp,
                },
                Mutation::Set {
                    key: this.key.clone(),
                    value: Value::U64(current.value.saturating_sub(n)),
                    expire_in: None,
                },
            ];
            this.coordinator.execute(mutations, &options).await
        })
        .await
    }

    /// Add `n` only if the counter currently equals `expected`
    ///
    /// A mismatch is a failed result carrying
    /// [`MutationError::ConditionNotMet`]; nothing is written.
    pub async fn conditional_increment(&self, expected: u64, n: u64) -> TransactionResult {
        let this = self;
        retry_guarded(&self.options, move |options| async move {
            let current = match read_counter(this.coordinator.store().as_ref(), &this.key).await {
                Ok(current) => current,
                Err(e) => return failed_before_commit(Vec::new(), e),
            };
            let mutations = vec![
                Mutation::Check {
                    key: this.key.clone(),
                    versionstamp: current.versionstamp,
                },
                Mutation::Sum {
                    key: this.key.clone(),
                    value: n,
                },
            ];
            if current.value != expected {
                let error = MutationError::ConditionNotMet {
                    key: this.key.clone(),
                    expected,
                    actual: current.value,
                };
                return failed_before_commit(mutations, error);
            }
            this.coordinator.execute(mutations, &options).await
        })
        .await
    }

    /// Set the counter back to zero
    pub async fn reset(&self) -> TransactionResult {
        let mutation = Mutation::Set {
            key: self.key.clone(),
            value: Value::U64(0),
            expire_in: None,
        };
        self.coordinator.execute(vec![mutation], &self.options).await
    }
}
