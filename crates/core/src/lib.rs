//! Core types for kvorm
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Unified value enum for stored data
//! - Key / KeyPart: Ordered composite keys
//! - Versionstamp: Per-commit revision token used by compare-and-swap checks
//! - Limits: Key, value and transaction size limits
//! - Error: Error type for keys, values and store operations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod limits;
pub mod value;
pub mod versionstamp;

pub use error::{Error, Result};
pub use key::{validate_key, validate_key_with_limits, Key, KeyError, KeyPart};
pub use limits::{Limits, DEFAULT_MAX_OPERATIONS};
pub use value::Value;
pub use versionstamp::{ParseVersionstampError, Versionstamp};
