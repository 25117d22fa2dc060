//! Entity model for kvorm
//!
//! This crate describes how entities map onto an ordered key space:
//! - KeySchema: literal/field segments turned into composite keys
//! - EntityDescriptor: primary key, secondary indexes, relations, validator
//! - Validator / ObjectSchema: value normalization with field-level errors
//! - Registry: explicit name → descriptor map with lazy relation resolution
//!
//! Nothing here touches storage. The mutation engine consumes descriptors
//! to derive every key a write must maintain.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity;
pub mod error;
pub mod key_schema;
pub mod registry;
pub mod schema;
pub mod validator;

pub use entity::{
    Entity, EntityBuilder, EntityDescriptor, Relation, RelationKind, SecondaryIndex, StorageMode,
};
pub use error::{ModelError, ModelResult};
pub use key_schema::{KeySchema, KeySegment};
pub use registry::Registry;
pub use schema::{FieldType, ObjectSchema};
pub use validator::{AcceptAll, FieldError, Validator};
