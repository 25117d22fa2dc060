//! Versionstamps
//!
//! Every committed write is tagged with a versionstamp. All keys written by
//! one atomic commit share the same versionstamp, and later commits always
//! receive strictly greater ones. Versionstamps are the currency of the
//! compare-and-swap checks used for optimistic concurrency.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque, totally ordered revision token attached to every stored key
///
/// Displays as 20 lowercase hex digits, e.g. `00000000000000000001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Versionstamp(u64);

impl Versionstamp {
    /// The versionstamp that precedes every commit
    pub const ZERO: Versionstamp = Versionstamp(0);

    /// Create a versionstamp from its raw counter value
    pub const fn new(raw: u64) -> Self {
        Versionstamp(raw)
    }

    /// Raw counter value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The next versionstamp in sequence
    pub const fn next(self) -> Self {
        Versionstamp(self.0 + 1)
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020x}", self.0)
    }
}

/// Error parsing a versionstamp from its hex form
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid versionstamp '{0}': expected 20 hex digits")]
pub struct ParseVersionstampError(String);

impl FromStr for Versionstamp {
    type Err = ParseVersionstampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 20 {
            return Err(ParseVersionstampError(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Versionstamp)
            .map_err(|_| ParseVersionstampError(s.to_string()))
    }
}
