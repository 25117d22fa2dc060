//! Native atomic transaction builder
//!
//! An [`AtomicOperation`] collects compare-and-swap checks and primitive
//! mutations. Committing it through [`KvStore::commit`](crate::KvStore::commit)
//! applies every mutation or none of them:
//!
//! 1. Every check compares the key's current versionstamp with the expected
//!    one (`None` = the key must be absent)
//! 2. If any check fails the commit is rejected and nothing is written
//! 3. Otherwise all mutations are applied under one fresh versionstamp
//!
//! The builder is plain data. It never touches the store by itself.

use std::time::Duration;

use kvorm_core::{Key, Value, Versionstamp};

/// A compare-and-swap precondition
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    /// Key to check
    pub key: Key,
    /// Expected versionstamp (`None` = key must not exist)
    pub versionstamp: Option<Versionstamp>,
}

/// A primitive mutation inside an atomic transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Write a value, optionally expiring after a duration
    Set {
        /// Target key
        key: Key,
        /// Value to write
        value: Value,
        /// Relative expiry
        expire_in: Option<Duration>,
    },
    /// Remove a key
    Delete {
        /// Target key
        key: Key,
    },
    /// Wrapping unsigned addition (absent = 0)
    Sum {
        /// Target key
        key: Key,
        /// Operand
        value: u64,
    },
    /// Keep the smaller of current and operand (absent = operand)
    Min {
        /// Target key
        key: Key,
        /// Operand
        value: u64,
    },
    /// Keep the larger of current and operand (absent = operand)
    Max {
        /// Target key
        key: Key,
        /// Operand
        value: u64,
    },
}

impl Operation {
    /// Key this operation writes
    pub fn key(&self) -> &Key {
        match self {
            Operation::Set { key, .. }
            | Operation::Delete { key }
            | Operation::Sum { key, .. }
            | Operation::Min { key, .. }
            | Operation::Max { key, .. } => key,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Set { .. } => "set",
            Operation::Delete { .. } => "delete",
            Operation::Sum { .. } => "sum",
            Operation::Min { .. } => "min",
            Operation::Max { .. } => "max",
        }
    }
}

/// Outcome of committing an atomic transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All checks passed and every mutation was applied
    Committed {
        /// Versionstamp assigned to every written key
        versionstamp: Versionstamp,
    },
    /// At least one check failed; nothing was written
    Rejected,
}

impl CommitOutcome {
    /// True when the transaction was applied
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    /// Versionstamp of an applied transaction
    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            CommitOutcome::Committed { versionstamp } => Some(*versionstamp),
            CommitOutcome::Rejected => None,
        }
    }
}

/// Builder for one native atomic transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicOperation {
    checks: Vec<Check>,
    operations: Vec<Operation>,
}

impl AtomicOperation {
    /// Create an empty atomic operation
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to currently carry `versionstamp` (`None` = absent)
    pub fn check(&mut self, key: Key, versionstamp: Option<Versionstamp>) -> &mut Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    /// Write `value` at `key`
    pub fn set(&mut self, key: Key, value: Value) -> &mut Self {
        self.operations.push(Operation::Set {
            key,
            value,
            expire_in: None,
        });
        self
    }

    /// Write `value` at `key` with an optional relative expiry
    pub fn set_with_expiry(
        &mut self,
        key: Key,
        value: Value,
        expire_in: Option<Duration>,
    ) -> &mut Self {
        self.operations.push(Operation::Set {
            key,
            value,
            expire_in,
        });
        self
    }

    /// Remove `key`
    pub fn delete(&mut self, key: Key) -> &mut Self {
        self.operations.push(Operation::Delete { key });
        self
    }

    /// Add `value` to the unsigned counter at `key`
    pub fn sum(&mut self, key: Key, value: u64) -> &mut Self {
        self.operations.push(Operation::Sum { key, value });
        self
    }

    /// Lower the unsigned counter at `key` to `value` if it is larger
    pub fn min(&mut self, key: Key, value: u64) -> &mut Self {
        self.operations.push(Operation::Min { key, value });
        self
    }

    /// Raise the unsigned counter at `key` to `value` if it is smaller
    pub fn max(&mut self, key: Key, value: u64) -> &mut Self {
        self.operations.push(Operation::Max { key, value });
        self
    }

    /// Checks in insertion order
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Mutations in insertion order
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Total number of checks and mutations
    pub fn len(&self) -> usize {
        self.checks.len() + self.operations.len()
    }

    /// True when there is nothing to commit
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
