//! Pre-flight validation of a batch
//!
//! Checks run sequentially in intent order against pre-existing store state
//! only; an intent never sees the effect of an earlier intent in the same
//! batch. The first failure stops the walk and is returned wrapped in
//! [`MutationError::Validation`] with the intent's position.
//!
//! The CREATE existence read is a fast-fail filter. The compiled
//! transaction's absence guard is what actually prevents duplicates.

use kvorm_model::EntityDescriptor;
use kvorm_storage::KvStore;
use kvorm_core::Value;
use tracing::trace;

use crate::error::{MutationError, MutationResult};
use crate::lookup::find_record;
use crate::mutation::{Lookup, Mutation};

/// Run an entity's validator, tagging failures with the entity name
pub(crate) fn normalize(entity: &EntityDescriptor, value: &Value) -> MutationResult<Value> {
    entity.validate(value).map_err(|errors| MutationError::Schema {
        entity: entity.name().to_string(),
        errors,
    })
}

pub(crate) fn require_object(data: &Value, what: &str) -> MutationResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(MutationError::malformed(format!(
            "{} needs object data, got {}",
            what,
            data.type_name()
        )))
    }
}

pub(crate) fn require_lookup(lookup: &Lookup, what: &str) -> MutationResult<()> {
    if lookup.value().is_null() {
        Err(MutationError::malformed(format!("{} needs a key", what)))
    } else {
        Ok(())
    }
}

/// Pre-flight checker for a batch of intents
pub struct MutationValidator<'a> {
    store: &'a dyn KvStore,
}

impl<'a> MutationValidator<'a> {
    /// Validator reading from `store`
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    /// Check every intent in order, stopping at the first failure
    pub async fn validate(&self, mutations: &[Mutation]) -> MutationResult<()> {
        for (index, mutation) in mutations.iter().enumerate() {
            self.validate_one(mutation)
                .await
                .map_err(|source| MutationError::Validation {
                    index,
                    source: Box::new(source),
                })?;
            trace!(target: "kvorm::txn", index, %mutation, "Intent validated");
        }
        Ok(())
    }

    async fn validate_one(&self, mutation: &Mutation) -> MutationResult<()> {
        match mutation {
            Mutation::Create { entity, data } => {
                require_object(data, "create")?;
                let value = normalize(entity, data)?;
                let key = entity.primary_key_of(&value)?;
                if self.store.get(&key).await?.is_some() {
                    return Err(MutationError::AlreadyExists {
                        entity: entity.name().to_string(),
                        key,
                    });
                }
                Ok(())
            }
            Mutation::Update {
                entity,
                key,
                data,
                merge,
            } => {
                require_lookup(key, "update")?;
                require_object(data, "update")?;
                let existing = find_record(self.store, entity, key).await?.ok_or_else(|| {
                    MutationError::NotFound {
                        entity: entity.name().to_string(),
                        lookup: key.to_string(),
                    }
                })?;
                let candidate = if *merge {
                    existing.value.merged(data)
                } else {
                    data.clone()
                };
                normalize(entity, &candidate)?;
                Ok(())
            }
            Mutation::Delete { entity, key, .. } => {
                require_lookup(key, "delete")?;
                if find_record(self.store, entity, key).await?.is_none() {
                    return Err(MutationError::NotFound {
                        entity: entity.name().to_string(),
                        lookup: key.to_string(),
                    });
                }
                Ok(())
            }
            Mutation::Set { .. }
            | Mutation::Check { .. }
            | Mutation::Sum { .. }
            | Mutation::Min { .. }
            | Mutation::Max { .. } => Ok(()),
        }
    }
}
