//! Read-modify-write helpers built on the mutation builder
//!
//! Each helper reads current state, then commits a batch guarded by CHECKs
//! on the versionstamps it read. A rejected commit means the state moved
//! underneath; the helper re-reads and tries again within the caller's
//! retry budget. The inner commit never retries on its own, since resending
//! stale guards could only be rejected again.
//!
//! Programmer errors (swapping a key with itself, composing nothing) are
//! returned as `Err`. Everything the store decides is a [`TransactionResult`].

use std::future::Future;

use kvorm_core::{Key, Value};
use kvorm_model::Entity;
use kvorm_storage::KvStore;
use tracing::warn;

use crate::builder::MutationBuilder;
use crate::coordinator::CommitCoordinator;
use crate::counter::{read_counter, Counter};
use crate::error::{MutationError, MutationResult};
use crate::lookup::find_record;
use crate::mutation::{Lookup, Mutation};
use crate::options::CommitOptions;
use crate::result::{FailedMutation, TransactionResult};

/// Whether a guarded attempt failed because the state it read went stale
fn is_stale(result: &TransactionResult) -> bool {
    match result.error() {
        Some(error) => {
            error.is_conflict()
                || error.is_retryable()
                || matches!(
                    error.root_cause(),
                    MutationError::AlreadyExists { .. } | MutationError::NotFound { .. }
                )
        }
        None => false,
    }
}

/// Run `attempt` until it succeeds, fails for a non-stale reason, or the
/// retry budget in `options` runs out
///
/// `attempt` receives the options for its single inner commit.
pub(crate) async fn retry_guarded<F, Fut>(options: &CommitOptions, mut attempt: F) -> TransactionResult
where
    F: FnMut(CommitOptions) -> Fut,
    Fut: Future<Output = TransactionResult>,
{
    let inner = options.clone().with_retry(false);
    let max_attempts = options.max_attempts();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let mut result = attempt(inner.clone()).await;

        if result.ok || !is_stale(&result) || attempts >= max_attempts {
            if let Some(failed) = result.failed_mutation.as_mut() {
                if failed.error.is_conflict() {
                    failed.error = MutationError::Conflict { attempts };
                }
            }
            result.attempts = attempts;
            return result;
        }

        warn!(
            target: "kvorm::txn",
            attempt = attempts,
            max_attempts,
            error = ?result.error(),
            "Guarded read went stale, re-reading"
        );
        tokio::time::sleep(options.retry_delay).await;
    }
}

/// Failed result for an error raised before any commit was attempted
pub(crate) fn failed_before_commit(mutations: Vec<Mutation>, error: MutationError) -> TransactionResult {
    TransactionResult::failure(mutations, FailedMutation::batch(error), 0)
}

/// Move `amount` from one counter to another in one guarded transaction
///
/// Both counters must live in the same store; the transfer commits through
/// `from`'s coordinator and options. A source holding less than `amount`
/// yields a failed result with [`MutationError::InsufficientValue`] and
/// leaves both counters untouched.
pub async fn transfer(from: &Counter, to: &Counter, amount: u64) -> MutationResult<TransactionResult> {
    if from.key() == to.key() {
        return Err(MutationError::InvalidArgument(format!(
            "cannot transfer from {} to itself",
            from.key()
        )));
    }

    let coordinator = from.coordinator();
    let result = retry_guarded(from.options(), move |options| async move {
        let store = coordinator.store().as_ref();
        let (source, target) = match (read_counter(store, from.key()).await, read_counter(store, to.key()).await) {
            (Ok(source), Ok(target)) => (source, target),
            (Err(e), _) | (_, Err(e)) => return failed_before_commit(Vec::new(), e),
        };

        let mutations = vec![
            Mutation::Check {
                key: from.key().clone(),
                versionstamp: source.versionstamp,
            },
            Mutation::Check {
                key: to.key().clone(),
                versionstamp: target.versionstamp,
            },
            Mutation::Set {
                key: from.key().clone(),
                value: Value::U64(source.value.saturating_sub(amount)),
                expire_in: None,
            },
            Mutation::Set {
                key: to.key().clone(),
                value: Value::U64(target.value.wrapping_add(amount)),
                expire_in: None,
            },
        ];

        if source.value < amount {
            let error = MutationError::InsufficientValue {
                key: from.key().clone(),
                available: source.value,
                requested: amount,
            };
            return failed_before_commit(mutations, error);
        }
        coordinator.execute(mutations, &options).await
    })
    .await;

    Ok(result)
}

/// Exchange the values stored at two raw keys in one guarded transaction
///
/// Both keys must hold a value; an absent side yields a failed result with
/// [`MutationError::InvalidArgument`].
pub async fn swap(
    coordinator: &CommitCoordinator,
    a: &Key,
    b: &Key,
    options: &CommitOptions,
) -> MutationResult<TransactionResult> {
    if a == b {
        return Err(MutationError::InvalidArgument(format!("cannot swap {} with itself", a)));
    }

    let result = retry_guarded(options, move |options| async move {
        let store = coordinator.store().as_ref();
        let entries = match store.get_many(&[a.clone(), b.clone()]).await {
            Ok(entries) => entries,
            Err(e) => return failed_before_commit(Vec::new(), e.into()),
        };
        let (left, right) = match entries.as_slice() {
            [Some(left), Some(right)] => (left.clone(), right.clone()),
            [left, _] => {
                let missing = if left.is_none() { a } else { b };
                let error = MutationError::InvalidArgument(format!("cannot swap absent key {}", missing));
                return failed_before_commit(Vec::new(), error);
            }
            _ => {
                let error = MutationError::malformed("store returned a short batch read");
                return failed_before_commit(Vec::new(), error);
            }
        };

        let mutations = vec![
            Mutation::Check {
                key: a.clone(),
                versionstamp: Some(left.versionstamp),
            },
            Mutation::Check {
                key: b.clone(),
                versionstamp: Some(right.versionstamp),
            },
            Mutation::Set {
                key: a.clone(),
                value: right.value,
                expire_in: None,
            },
            Mutation::Set {
                key: b.clone(),
                value: left.value,
                expire_in: None,
            },
        ];
        coordinator.execute(mutations, &options).await
    })
    .await;

    Ok(result)
}

/// Merge `data` into the record `lookup` finds, or create it from `data`
///
/// The decision is re-made on every attempt, so a record created or deleted
/// concurrently flips the branch instead of failing the call.
pub async fn upsert(
    coordinator: &CommitCoordinator,
    entity: &Entity,
    lookup: &Lookup,
    data: &Value,
    options: &CommitOptions,
) -> TransactionResult {
    retry_guarded(options, move |options| async move {
        let found = match find_record(coordinator.store().as_ref(), entity, lookup).await {
            Ok(found) => found,
            Err(e) => return failed_before_commit(Vec::new(), e),
        };

        let mutation = match found {
            Some(_) => Mutation::Update {
                entity: entity.clone(),
                key: lookup.clone(),
                data: data.clone(),
                merge: true,
            },
            None => Mutation::Create {
                entity: entity.clone(),
                data: data.clone(),
            },
        };
        coordinator.execute(vec![mutation], &options).await
    })
    .await
}

/// Concatenate the intents of several builders into one batch
///
/// The result commits through the first builder's coordinator and options.
pub fn compose(builders: &[&MutationBuilder]) -> MutationResult<MutationBuilder> {
    let Some((first, rest)) = builders.split_first() else {
        return Err(MutationError::InvalidArgument(
            "compose needs at least one builder".to_string(),
        ));
    };

    let mut composed = MutationBuilder::with_coordinator(first.coordinator().clone())
        .with_options(first.options().clone());
    composed.extend(first.mutations());
    for builder in rest {
        composed.extend(builder.mutations());
    }
    Ok(composed)
}
