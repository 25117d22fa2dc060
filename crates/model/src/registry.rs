//! Entity registry
//!
//! Maps entity names to their descriptors. A registry is an ordinary value
//! owned by whoever opened the store; there is no process-wide instance.
//! Relations resolve their targets through it lazily, by name.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tracing::debug;

use crate::entity::Entity;
use crate::error::{ModelError, ModelResult};

/// Concurrent name → descriptor map
#[derive(Debug, Default)]
pub struct Registry {
    entities: DashMap<String, Entity>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity; names must be unique
    pub fn register(&self, entity: Entity) -> ModelResult<()> {
        match self.entities.entry(entity.name().to_string()) {
            MapEntry::Occupied(_) => Err(ModelError::DuplicateEntity(entity.name().to_string())),
            MapEntry::Vacant(slot) => {
                debug!(target: "kvorm::model", entity = entity.name(), "Registered entity");
                slot.insert(entity);
                Ok(())
            }
        }
    }

    /// Look up an entity by name
    pub fn get(&self, name: &str) -> Option<Entity> {
        self.entities.get(name).map(|e| e.value().clone())
    }

    /// Look up an entity by name, failing when it is not registered
    pub fn resolve(&self, name: &str) -> ModelResult<Entity> {
        self.get(name)
            .ok_or_else(|| ModelError::UnknownEntity(name.to_string()))
    }

    /// Whether an entity is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.entities.clear();
    }
}
