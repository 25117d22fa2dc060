//! Size limits for keys, values and atomic transactions
//!
//! These limits are enforced by the store before any state changes.
//! Violations result in `InvalidKey`, `ValueTooLarge` or
//! `TooManyOperations` errors.

use crate::error::Error;
use crate::key::{validate_key_with_limits, Key};
use crate::value::Value;

/// Default per-transaction operation budget of the store
pub const DEFAULT_MAX_OPERATIONS: usize = 1000;

/// Size limits for keys, values and atomic transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum encoded key length in bytes (default: 2048)
    pub max_key_bytes: usize,

    /// Maximum encoded value size in bytes (default: 64KB)
    pub max_value_bytes: usize,

    /// Maximum checks + mutations in one atomic transaction (default: 1000)
    pub max_operations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_bytes: 2048,
            max_value_bytes: 64 * 1024,
            max_operations: DEFAULT_MAX_OPERATIONS,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    ///
    /// Lets unit tests exercise limit enforcement without building
    /// extremely large keys, values or transactions.
    pub fn with_small_limits() -> Self {
        Limits {
            max_key_bytes: 100,
            max_value_bytes: 1000,
            max_operations: 10,
        }
    }

    /// Validate a key against these limits
    pub fn validate_key(&self, key: &Key) -> Result<(), Error> {
        validate_key_with_limits(key, self).map_err(Error::from)
    }

    /// Validate a value's encoded size against these limits
    pub fn validate_value(&self, value: &Value) -> Result<(), Error> {
        let size = value.encoded_size();
        if size > self.max_value_bytes {
            return Err(Error::ValueTooLarge {
                actual: size,
                max: self.max_value_bytes,
            });
        }
        Ok(())
    }

    /// Validate the number of operations in one atomic transaction
    pub fn validate_operation_count(&self, count: usize) -> Result<(), Error> {
        if count > self.max_operations {
            return Err(Error::TooManyOperations {
                actual: count,
                max: self.max_operations,
            });
        }
        Ok(())
    }
}
