//! Storage-layer entry wrapper with expiry support
//!
//! The boundary type [`Entry`](crate::Entry) doesn't include expiry because
//! expiry is a storage concern, not a contract concern. `StoredValue` pairs
//! the value and its versionstamp with an optional deadline.

use std::time::{Duration, Instant};

use kvorm_core::{Key, Value, Versionstamp};

use crate::traits::Entry;

/// A stored value with optional expiry
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredValue {
    value: Value,
    versionstamp: Versionstamp,
    expires_at: Option<Instant>,
}

impl StoredValue {
    /// Create a stored value, converting a relative expiry into a deadline
    pub(crate) fn new(
        value: Value,
        versionstamp: Versionstamp,
        expire_in: Option<Duration>,
        now: Instant,
    ) -> Self {
        StoredValue {
            value,
            versionstamp,
            expires_at: expire_in.map(|d| now + d),
        }
    }

    pub(crate) fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn versionstamp(&self) -> Versionstamp {
        self.versionstamp
    }

    /// Expired values are invisible to reads and checks
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    pub(crate) fn to_entry(&self, key: &Key) -> Entry {
        Entry {
            key: key.clone(),
            value: self.value.clone(),
            versionstamp: self.versionstamp,
        }
    }
}
