//! Error types for the mutation engine
//!
//! `MutationError` is the cause carried by every failed
//! [`TransactionResult`](crate::TransactionResult). It never escapes
//! `commit()` as an `Err`: the coordinator folds it into the result.

use std::time::Duration;

use kvorm_core::Key;
use kvorm_model::{FieldError, ModelError};
use thiserror::Error;

/// Result type alias for engine operations that can fail outright
pub type MutationResult<T> = std::result::Result<T, MutationError>;

/// Why a batch (or one of its intents) failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MutationError {
    /// Commit was called on an empty builder
    #[error("No mutations to commit")]
    EmptyBatch,

    /// More intents than the configured maximum
    #[error("Too many mutations: {count} exceeds maximum {max}")]
    TooManyMutations {
        /// Intents in the batch
        count: usize,
        /// Configured maximum
        max: usize,
    },

    /// An intent is missing something it needs
    #[error("Malformed mutation: {0}")]
    Malformed(String),

    /// The entity validator rejected a value
    #[error("Schema validation failed for '{entity}': {}", join_field_errors(.errors))]
    Schema {
        /// Entity name
        entity: String,
        /// Every field error reported
        errors: Vec<FieldError>,
    },

    /// CREATE targeted an existing primary key
    #[error("Record already exists in '{entity}' at {key}")]
    AlreadyExists {
        /// Entity name
        entity: String,
        /// Primary key
        key: Key,
    },

    /// UPDATE/DELETE targeted a missing record
    #[error("Record not found in '{entity}' for {lookup}")]
    NotFound {
        /// Entity name
        entity: String,
        /// Rendered lookup
        lookup: String,
    },

    /// Lookup through an index the entity does not declare
    #[error("Unknown index '{index}' on '{entity}'")]
    UnknownIndex {
        /// Entity name
        entity: String,
        /// Requested index
        index: String,
    },

    /// UPDATE would move the record to a different primary key
    #[error("Update of '{entity}' would change primary key {from} to {to}")]
    PrimaryKeyChanged {
        /// Entity name
        entity: String,
        /// Current primary key
        from: Key,
        /// Primary key derived from the new value
        to: Key,
    },

    /// Pre-flight validation failed at one intent
    #[error("Validation failed at mutation {index}: {source}")]
    Validation {
        /// Position of the failing intent
        index: usize,
        /// Underlying cause
        source: Box<MutationError>,
    },

    /// Compiled transaction exceeds the store's operation budget
    #[error("Transaction too large: {operations} operations exceeds store maximum {max}")]
    TransactionTooLarge {
        /// Checks + mutations after compilation
        operations: usize,
        /// Store budget
        max: usize,
    },

    /// The store kept rejecting the commit's checks
    #[error("Transaction conflict: commit rejected after {attempts} attempt(s)")]
    Conflict {
        /// Attempts made
        attempts: u32,
    },

    /// The commit did not finish before the deadline; its effect is unknown
    #[error("Commit timed out after {}ms; the outcome is unknown", .after.as_millis())]
    Timeout {
        /// Configured deadline
        after: Duration,
    },

    /// A conditional helper found a different value than expected
    #[error("Condition not met at {key}: expected {expected}, found {actual}")]
    ConditionNotMet {
        /// Key that was read
        key: Key,
        /// Caller's expectation
        expected: u64,
        /// Value actually read
        actual: u64,
    },

    /// A transfer source holds less than requested
    #[error("Insufficient value at {key}: {available} available, {requested} requested")]
    InsufficientValue {
        /// Source key
        key: Key,
        /// Current value
        available: u64,
        /// Requested amount
        requested: u64,
    },

    /// A helper was called with arguments that can never succeed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store or key error
    #[error(transparent)]
    Store(#[from] kvorm_core::Error),

    /// Model or registry error
    #[error(transparent)]
    Model(#[from] ModelError),
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl MutationError {
    /// Create a malformed-intent error
    pub fn malformed(reason: impl Into<String>) -> Self {
        MutationError::Malformed(reason.into())
    }

    /// Whether re-running the whole commit could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            MutationError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether this is an exhausted compare-and-swap conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, MutationError::Conflict { .. })
    }

    /// The innermost cause, looking through `Validation`
    pub fn root_cause(&self) -> &MutationError {
        match self {
            MutationError::Validation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
