//! Error types for kvorm storage and key handling
//!
//! This module defines the error type shared by the core types and the
//! store boundary. We use `thiserror` for automatic `Display` and `Error`
//! trait implementations.

use crate::key::KeyError;
use thiserror::Error;

/// Result type alias for kvorm core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for keys, values and store operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// A key could not be derived from a value
    #[error("Malformed key: field '{field}': {reason}")]
    MalformedKey {
        /// Field the key builder was resolving ("" for a bare scalar)
        field: String,
        /// Why the value could not be used
        reason: String,
    },

    /// Key failed validation
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// Value exceeds the maximum encoded size
    #[error("Value too large: {actual} bytes exceeds maximum {max}")]
    ValueTooLarge {
        /// Encoded size of the value
        actual: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Atomic transaction exceeds the store's operation budget
    #[error("Too many operations in atomic transaction: {actual} exceeds maximum {max}")]
    TooManyOperations {
        /// Number of checks + mutations
        actual: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Operation applied to a value of the wrong type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        actual: &'static str,
    },

    /// List cursor could not be decoded
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Non-transient storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transient storage failure; retrying may succeed
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The store handle has been closed
    #[error("Store is closed")]
    Closed,
}

impl Error {
    /// Create a malformed-key error
    pub fn malformed_key(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedKey {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage(message.into())
    }

    /// Create a transient storage error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Error::Unavailable(message.into())
    }

    /// Whether retrying the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
