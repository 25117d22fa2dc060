//! kvorm - atomic object mapping over an ordered key-value store
//!
//! Entities are declared once (primary key, secondary indexes, relations,
//! validator) and mutated through batches that commit as a single
//! all-or-nothing store transaction.
//!
//! # Quick Start
//!
//! ```ignore
//! use kvorm::{Database, EntityDescriptor, StorageMode, MemoryStore};
//! use std::sync::Arc;
//!
//! let db = Database::open(Arc::new(MemoryStore::new()));
//! let users = db.register(
//!     EntityDescriptor::builder("users")
//!         .index_on("email", ["email"], StorageMode::Reference)
//!         .build()?,
//! )?;
//!
//! let mut batch = db.mutation();
//! batch.create(&users, serde_json::json!({"id": "u1", "email": "a@b.com"}));
//! let result = batch.commit().await;
//! assert!(result.ok);
//! ```
//!
//! # Architecture
//!
//! - `kvorm-core`: values, composite keys, versionstamps, limits
//! - `kvorm-storage`: the `KvStore` boundary and an in-memory store
//! - `kvorm-model`: key schemas, entity descriptors, validators, registry
//! - `kvorm-engine`: builder, validator, compiler, coordinator, helpers

pub use kvorm_core::{key, Error, Key, KeyPart, Limits, Result, Value, Versionstamp};
pub use kvorm_engine::*;
pub use kvorm_model::{
    AcceptAll, Entity, EntityBuilder, EntityDescriptor, FieldError, FieldType, KeySchema,
    KeySegment, ModelError, ObjectSchema, Registry, Relation, RelationKind, SecondaryIndex,
    StorageMode, Validator,
};
pub use kvorm_storage::{
    collect_list, AtomicOperation, Check, CommitOutcome, Entry, KvStore, ListOptions, ListPage,
    ListSelector, MemoryStore, Operation, SetOptions, WatchStream,
};
