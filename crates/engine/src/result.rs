//! Transaction results
//!
//! Every `commit()` returns a [`TransactionResult`], successful or not.
//! `versionstamp` is present iff `ok`; `failed_mutation` is present iff not.

use kvorm_core::Versionstamp;

use crate::error::{MutationError, MutationResult};
use crate::mutation::Mutation;

/// Where and why a commit failed
#[derive(Debug, Clone)]
pub struct FailedMutation {
    /// Position of the failing intent; `None` for batch-level failures
    pub index: Option<usize>,
    /// The failing intent when one can be named
    pub mutation: Option<Mutation>,
    /// Cause
    pub error: MutationError,
}

impl FailedMutation {
    /// A failure not attributable to one intent
    pub fn batch(error: MutationError) -> Self {
        Self {
            index: None,
            mutation: None,
            error,
        }
    }

    /// A failure pinned to one intent
    pub fn at(index: usize, mutation: Mutation, error: MutationError) -> Self {
        Self {
            index: Some(index),
            mutation: Some(mutation),
            error,
        }
    }

    /// Whether the failure is batch-level
    pub fn is_batch_level(&self) -> bool {
        self.index.is_none()
    }

    /// Position of the intent that caused the failure, if known
    ///
    /// Validation failures are reported batch-level but still carry the
    /// intent's real position inside the error.
    pub fn position(&self) -> Option<usize> {
        match (&self.index, &self.error) {
            (Some(index), _) => Some(*index),
            (None, MutationError::Validation { index, .. }) => Some(*index),
            (None, _) => None,
        }
    }
}

/// Outcome of one commit call
#[derive(Debug, Clone)]
pub struct TransactionResult {
    /// Whether the store accepted the transaction
    pub ok: bool,
    /// Every intent of the batch, in order
    pub mutations: Vec<Mutation>,
    /// Commit versionstamp (present iff `ok`)
    pub versionstamp: Option<Versionstamp>,
    /// Failure details (present iff not `ok`)
    pub failed_mutation: Option<FailedMutation>,
    /// Commit attempts made (0 when the store was never reached)
    pub attempts: u32,
}

impl TransactionResult {
    /// Successful result
    pub fn success(mutations: Vec<Mutation>, versionstamp: Versionstamp, attempts: u32) -> Self {
        Self {
            ok: true,
            mutations,
            versionstamp: Some(versionstamp),
            failed_mutation: None,
            attempts,
        }
    }

    /// Failed result
    pub fn failure(mutations: Vec<Mutation>, failed: FailedMutation, attempts: u32) -> Self {
        Self {
            ok: false,
            mutations,
            versionstamp: None,
            failed_mutation: Some(failed),
            attempts,
        }
    }

    /// Whether the commit succeeded
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// The failure cause, if any
    pub fn error(&self) -> Option<&MutationError> {
        self.failed_mutation.as_ref().map(|f| &f.error)
    }

    /// Whether the failure is an exhausted compare-and-swap conflict
    pub fn is_conflict(&self) -> bool {
        self.error().is_some_and(MutationError::is_conflict)
    }

    /// Convert into a plain `Result`
    pub fn into_result(self) -> MutationResult<Versionstamp> {
        match (self.versionstamp, self.failed_mutation) {
            (Some(versionstamp), _) if self.ok => Ok(versionstamp),
            (_, Some(failed)) => Err(failed.error),
            _ => Err(MutationError::malformed("result carries neither versionstamp nor failure")),
        }
    }
}
