//! Commit coordinator: validate, compile, commit, retry
//!
//! One `execute` call walks this state machine:
//!
//! ```text
//! Idle → Validating → Compiling → Committing → Success
//!                         ↑            │
//!                         └ RetryWait ←┤ (rejected / transient error)
//!                                      └→ Failed
//! ```
//!
//! `Validating` is skipped when validation is off. Every retry goes back to
//! `Compiling`, so UPDATE and DELETE re-read the records they guard.
//!
//! A timeout races the store commit against a timer. When the timer wins
//! the commit may still land; the result reports `Timeout` and the attempt
//! is never retried, since a retry could apply the batch twice.
//!
//! The coordinator holds no locks. Concurrent `execute` calls share only the
//! store handle and the metric counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kvorm_core::Versionstamp;
use kvorm_model::Registry;
use kvorm_storage::{CommitOutcome, KvStore};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::compiler::{CompileFailure, TransactionCompiler};
use crate::error::MutationError;
use crate::mutation::Mutation;
use crate::options::CommitOptions;
use crate::result::{FailedMutation, TransactionResult};
use crate::validation::MutationValidator;

/// Phase of a single commit call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// Not started
    Idle,
    /// Pre-flight checks
    Validating,
    /// Building the atomic operation
    Compiling,
    /// Waiting for the store
    Committing,
    /// Sleeping before the next attempt
    RetryWait,
    /// Committed
    Success,
    /// Gave up
    Failed,
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitPhase::Idle => "idle",
            CommitPhase::Validating => "validating",
            CommitPhase::Compiling => "compiling",
            CommitPhase::Committing => "committing",
            CommitPhase::RetryWait => "retry_wait",
            CommitPhase::Success => "success",
            CommitPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of the coordinator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// `execute` calls
    pub started: u64,
    /// Successful commits
    pub committed: u64,
    /// Failed commits (any cause)
    pub aborted: u64,
    /// Retries taken after a rejected or transient attempt
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_retries: AtomicU64,
}

/// Drives batches from intents to a committed transaction
///
/// # Memory Ordering
///
/// The counters use Relaxed ordering: they are observational only and do
/// not synchronize any other memory.
pub struct CommitCoordinator {
    store: Arc<dyn KvStore>,
    registry: Option<Arc<Registry>>,
    counters: Arc<Counters>,
}

impl fmt::Debug for CommitCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitCoordinator")
            .field("metrics", &self.metrics())
            .finish_non_exhaustive()
    }
}

enum Attempt {
    Committed(Versionstamp),
    Retry(MutationError),
    Fail(FailedMutation),
}

impl CommitCoordinator {
    /// Coordinator over a store
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            registry: None,
            counters: Arc::default(),
        }
    }

    /// Resolve cascade dependents through `registry`
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Coordinator over the same store and counters, resolving cascades
    /// through `registry`
    ///
    /// Commits through either coordinator show up in both `metrics()`.
    pub fn share_with_registry(&self, registry: Arc<Registry>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Some(registry),
            counters: Arc::clone(&self.counters),
        }
    }

    /// The store this coordinator commits to
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// The registry used for cascades, if any
    pub fn registry(&self) -> Option<&Arc<Registry>> {
        self.registry.as_ref()
    }

    /// Current counters
    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            started: self.counters.total_started.load(Ordering::Relaxed),
            committed: self.counters.total_committed.load(Ordering::Relaxed),
            aborted: self.counters.total_aborted.load(Ordering::Relaxed),
            retries: self.counters.total_retries.load(Ordering::Relaxed),
        }
    }

    /// Run one batch to completion
    ///
    /// Never fails: every failure is folded into the returned result.
    pub async fn execute(&self, mutations: Vec<Mutation>, options: &CommitOptions) -> TransactionResult {
        let commit_id = Uuid::new_v4();
        let span = info_span!(
            target: "kvorm::txn",
            "commit",
            %commit_id,
            intents = mutations.len()
        );
        self.counters.total_started.fetch_add(1, Ordering::Relaxed);

        let result = self.run(mutations, options).instrument(span).await;
        if result.ok {
            self.counters.total_committed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.total_aborted.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn run(&self, mutations: Vec<Mutation>, options: &CommitOptions) -> TransactionResult {
        if mutations.is_empty() {
            return self.fail(mutations, FailedMutation::batch(MutationError::EmptyBatch), 0);
        }
        if mutations.len() > options.max_mutations {
            let error = MutationError::TooManyMutations {
                count: mutations.len(),
                max: options.max_mutations,
            };
            return self.fail(mutations, FailedMutation::batch(error), 0);
        }

        if options.validate {
            transition(CommitPhase::Idle, CommitPhase::Validating);
            if let Err(error) = MutationValidator::new(self.store.as_ref())
                .validate(&mutations)
                .await
            {
                let mutation = match &error {
                    MutationError::Validation { index, .. } => mutations.get(*index).cloned(),
                    _ => None,
                };
                let failed = FailedMutation {
                    index: None,
                    mutation,
                    error,
                };
                return self.fail(mutations, failed, 0);
            }
        }

        let max_attempts = options.max_attempts();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            transition(CommitPhase::Validating, CommitPhase::Compiling);

            match self.attempt(&mutations, options).await {
                Attempt::Committed(versionstamp) => {
                    transition(CommitPhase::Committing, CommitPhase::Success);
                    info!(target: "kvorm::txn", %versionstamp, attempts, "Transaction committed");
                    return TransactionResult::success(mutations, versionstamp, attempts);
                }
                Attempt::Retry(error) if attempts < max_attempts => {
                    transition(CommitPhase::Committing, CommitPhase::RetryWait);
                    warn!(
                        target: "kvorm::txn",
                        attempt = attempts,
                        max_attempts,
                        error = %error,
                        "Commit attempt failed, retrying"
                    );
                    self.counters.total_retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(options.retry_delay).await;
                }
                Attempt::Retry(error) => {
                    let error = match error {
                        MutationError::Conflict { .. } => MutationError::Conflict { attempts },
                        other => other,
                    };
                    return self.fail(mutations, FailedMutation::batch(error), attempts);
                }
                Attempt::Fail(failed) => return self.fail(mutations, failed, attempts),
            }
        }
    }

    async fn attempt(&self, mutations: &[Mutation], options: &CommitOptions) -> Attempt {
        let mut compiler = TransactionCompiler::new(self.store.as_ref());
        if let Some(registry) = &self.registry {
            compiler = compiler.with_registry(registry);
        }

        let operation = match compiler.compile(mutations).await {
            Ok(operation) => operation,
            Err(CompileFailure { error, .. }) if error.is_retryable() => {
                return Attempt::Retry(error);
            }
            Err(CompileFailure { index, error }) => {
                let mutation = index.and_then(|i| mutations.get(i).cloned());
                return Attempt::Fail(FailedMutation {
                    index,
                    mutation,
                    error,
                });
            }
        };

        transition(CommitPhase::Compiling, CommitPhase::Committing);
        let commit = self.store.commit(operation);
        let outcome = match options.timeout {
            Some(after) => match tokio::time::timeout(after, commit).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        target: "kvorm::txn",
                        timeout_ms = after.as_millis() as u64,
                        "Commit timed out; outcome unknown"
                    );
                    return Attempt::Fail(FailedMutation::batch(MutationError::Timeout { after }));
                }
            },
            None => commit.await,
        };

        match outcome {
            Ok(CommitOutcome::Committed { versionstamp }) => Attempt::Committed(versionstamp),
            Ok(CommitOutcome::Rejected) => Attempt::Retry(MutationError::Conflict { attempts: 0 }),
            Err(e) if e.is_retryable() => Attempt::Retry(MutationError::Store(e)),
            Err(e) => Attempt::Fail(FailedMutation::batch(MutationError::Store(e))),
        }
    }

    fn fail(&self, mutations: Vec<Mutation>, failed: FailedMutation, attempts: u32) -> TransactionResult {
        transition(CommitPhase::Committing, CommitPhase::Failed);
        warn!(
            target: "kvorm::txn",
            index = ?failed.index,
            error = %failed.error,
            attempts,
            "Transaction aborted"
        );
        TransactionResult::failure(mutations, failed, attempts)
    }
}

fn transition(from: CommitPhase, to: CommitPhase) {
    debug!(target: "kvorm::txn", %from, %to, "Commit phase");
}
