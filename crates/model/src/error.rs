//! Error types for entity modelling

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors raised while describing or registering entities
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Descriptor failed builder validation
    #[error("Invalid entity '{entity}': {reason}")]
    InvalidDescriptor {
        /// Entity name as given to the builder
        entity: String,
        /// What is wrong with it
        reason: String,
    },

    /// An entity with this name is already registered
    #[error("Entity '{0}' is already registered")]
    DuplicateEntity(String),

    /// No entity with this name is registered
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    /// A string could not be parsed into an enum variant
    #[error("Unknown {kind} '{value}'")]
    UnknownVariant {
        /// Which enum was being parsed
        kind: &'static str,
        /// The rejected input
        value: String,
    },
}

impl ModelError {
    /// Create an invalid-descriptor error
    pub fn invalid(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::InvalidDescriptor {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}
