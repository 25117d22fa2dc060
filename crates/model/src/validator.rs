//! Per-entity value validation
//!
//! A validator either accepts an input and returns the normalized value to
//! persist, or rejects it with every field-level problem it found.

use std::fmt;

use kvorm_core::Value;
use serde::{Deserialize, Serialize};

/// One field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path (empty for whole-value problems)
    pub field: String,
    /// Human-readable message
    pub message: String,
}

impl FieldError {
    /// Create a field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Schema validator for one entity
pub trait Validator: Send + Sync {
    /// Validate and normalize a value
    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>>;
}

/// Validator that accepts every value unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        Ok(value.clone())
    }
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<Value, Vec<FieldError>> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        self(value)
    }
}
