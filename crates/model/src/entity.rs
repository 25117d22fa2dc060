//! Entity descriptors
//!
//! An [`EntityDescriptor`] is the static description of one record type:
//! its primary-key schema, secondary indexes, relations and validator. It is
//! built once through [`EntityDescriptor::builder`], validated, and shared
//! immutably as an [`Entity`] (`Arc<EntityDescriptor>`).
//!
//! ## Derived keys
//!
//! | Kind              | Key                                                        |
//! |-------------------|------------------------------------------------------------|
//! | primary           | `primary_key.build(value)` (default `[name, value.id]`)    |
//! | secondary index   | `index.key.build(value)` (`index_on`: `[{name}_by_{index}, fields..]`) |
//! | relation          | `[{name}_rel_{relation}, local field values.., pk field values..]` |
//!
//! Relations name their target and join entities; they never hold
//! references to other descriptors. Resolution happens lazily through a
//! [`Registry`](crate::Registry), so cyclic graphs need no special handling.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use kvorm_core::{Key, KeyPart, Result, Value};

use crate::error::{ModelError, ModelResult};
use crate::key_schema::KeySchema;
use crate::validator::{AcceptAll, FieldError, Validator};

/// Shared handle to an immutable entity descriptor
pub type Entity = Arc<EntityDescriptor>;

// ============================================================================
// Storage mode / relation kind
// ============================================================================

/// What a derived index stores at its key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StorageMode {
    /// Only a designated field (by default the primary-key field)
    #[default]
    Reference,
    /// A full copy of the entity value
    Copy,
}

/// Normalize a legacy spelling: lowercase, no separators
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

impl FromStr for StorageMode {
    type Err = ModelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "reference" | "ref" | "pointer" => Ok(StorageMode::Reference),
            "copy" | "full" | "duplicate" | "embed" | "embedded" => Ok(StorageMode::Copy),
            _ => Err(ModelError::UnknownVariant {
                kind: "storage mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Cardinality of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// This record owns many target records
    OneToMany,
    /// This record points at one target record
    ManyToOne,
    /// Records on both sides are linked through a join entity
    ManyToMany,
}

impl FromStr for RelationKind {
    type Err = ModelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "onetomany" | "hasmany" => Ok(RelationKind::OneToMany),
            "manytoone" | "belongsto" => Ok(RelationKind::ManyToOne),
            "manytomany" | "belongstomany" | "hasandbelongstomany" => Ok(RelationKind::ManyToMany),
            _ => Err(ModelError::UnknownVariant {
                kind: "relation kind",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Indexes and relations
// ============================================================================

/// A secondary index maintained alongside the primary record
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryIndex {
    /// Index name, unique within the entity
    pub name: String,
    /// Key schema evaluated against the entity value
    pub key: KeySchema,
    /// What is stored at the index key
    pub storage: StorageMode,
    /// Field stored in REFERENCE mode (default: the primary key)
    pub reference_field: Option<String>,
}

impl SecondaryIndex {
    /// Create an index with an explicit key schema
    pub fn new(name: impl Into<String>, key: KeySchema, storage: StorageMode) -> Self {
        Self {
            name: name.into(),
            key,
            storage,
            reference_field: None,
        }
    }

    /// Store this field in REFERENCE mode
    pub fn with_reference_field(mut self, field: impl Into<String>) -> Self {
        self.reference_field = Some(field.into());
        self
    }
}

/// A relation to another entity, named rather than referenced
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Relation name, unique within the entity
    pub name: String,
    /// Target entity name
    pub target: String,
    /// Fields of this entity that lead the relation-index key
    pub local_fields: Vec<String>,
    /// Cardinality
    pub kind: RelationKind,
    /// What is stored at the relation-index key
    pub storage: StorageMode,
    /// Fields holding the link: on this record for MANY_TO_ONE, on target
    /// (or join) records for ONE_TO_MANY and MANY_TO_MANY. One field per
    /// primary-key field of the linked owner, in key order.
    pub foreign_keys: Vec<String>,
    /// Join entity for MANY_TO_MANY
    pub join_entity: Option<String>,
    /// Delete linked target records along with this one
    pub cascade: bool,
}

impl Relation {
    /// Create a relation in REFERENCE mode with no local fields
    pub fn new(name: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_fields: Vec::new(),
            kind,
            storage: StorageMode::Reference,
            foreign_keys: Vec::new(),
            join_entity: None,
            cascade: false,
        }
    }

    /// Set the local key fields
    pub fn with_local_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.local_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the storage mode
    pub fn with_storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    /// Set a single foreign-key field
    pub fn with_foreign_key(mut self, field: impl Into<String>) -> Self {
        self.foreign_keys = vec![field.into()];
        self
    }

    /// Set the foreign-key fields for an owner with a composite key
    pub fn with_foreign_keys<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_keys = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the join entity
    pub fn through(mut self, join_entity: impl Into<String>) -> Self {
        self.join_entity = Some(join_entity.into());
        self
    }

    /// Enable cascade delete
    pub fn cascading(mut self) -> Self {
        self.cascade = true;
        self
    }
}

// ============================================================================
// EntityDescriptor
// ============================================================================

/// Static description of one entity type
pub struct EntityDescriptor {
    name: String,
    primary_key: KeySchema,
    indexes: Vec<SecondaryIndex>,
    relations: Vec<Relation>,
    validator: Arc<dyn Validator>,
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .field("indexes", &self.indexes)
            .field("relations", &self.relations)
            .finish_non_exhaustive()
    }
}

impl EntityDescriptor {
    /// Start describing an entity
    pub fn builder(name: impl Into<String>) -> EntityBuilder {
        EntityBuilder::new(name)
    }

    /// Entity name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary-key schema
    pub fn primary_key(&self) -> &KeySchema {
        &self.primary_key
    }

    /// Secondary indexes
    pub fn indexes(&self) -> &[SecondaryIndex] {
        &self.indexes
    }

    /// Relations
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Look up an index by name
    pub fn index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Look up a relation by name
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Run the entity's validator
    pub fn validate(&self, value: &Value) -> std::result::Result<Value, Vec<FieldError>> {
        self.validator.validate(value)
    }

    /// Key prefix shared by every record of this entity
    pub fn record_prefix(&self) -> Key {
        self.primary_key.literal_prefix()
    }

    /// Primary key of a value (or of a scalar primary-key shorthand)
    pub fn primary_key_of(&self, value: &Value) -> Result<Key> {
        self.primary_key.build(value)
    }

    /// Key of an index entry for a value
    pub fn index_key(&self, index: &SecondaryIndex, value: &Value) -> Result<Key> {
        index.key.build(value)
    }

    /// Key of the index entry a stored record owns
    ///
    /// `Ok(None)` when an indexed field is absent or null; such records are
    /// left out of the index.
    pub fn index_entry_key(&self, index: &SecondaryIndex, value: &Value) -> Result<Option<Key>> {
        if index
            .key
            .fields()
            .any(|field| value.get(field).map_or(true, Value::is_null))
        {
            return Ok(None);
        }
        index.key.build(value).map(Some)
    }

    /// Whether an index entry's stored value rebuilds the primary key
    ///
    /// True for COPY indexes and for REFERENCE indexes storing the primary
    /// key itself. An index designating any other field stores a value that
    /// cannot name the record on its own.
    pub fn index_resolves_key(&self, index: &SecondaryIndex) -> bool {
        match (index.storage, index.reference_field.as_deref()) {
            (StorageMode::Copy, _) | (StorageMode::Reference, None) => true,
            (StorageMode::Reference, Some(field)) => {
                self.primary_key.field_count() == 1
                    && self.primary_key.fields().next() == Some(field)
            }
        }
    }

    /// Value written at an index key
    pub fn index_value(&self, index: &SecondaryIndex, value: &Value) -> Value {
        match (index.storage, index.reference_field.as_deref()) {
            (StorageMode::Reference, Some(field)) => {
                value.get(field).cloned().unwrap_or(Value::Null)
            }
            (StorageMode::Reference, None) => self.reference_value(value),
            (StorageMode::Copy, _) => value.clone(),
        }
    }

    /// Primary-key field values of a record, in key order
    pub fn key_values(&self, value: &Value) -> Vec<Value> {
        self.primary_key
            .fields()
            .map(|field| value.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Value stored in REFERENCE mode: the primary key
    ///
    /// A scalar for single-field keys, the positional tuple otherwise.
    /// Either shape feeds straight back into [`primary_key_of`](Self::primary_key_of).
    pub fn reference_value(&self, value: &Value) -> Value {
        let mut values = self.key_values(value);
        if values.len() == 1 {
            values.pop().unwrap_or(Value::Null)
        } else {
            Value::Array(values)
        }
    }

    /// Key of a relation entry for a value
    ///
    /// `Ok(None)` when a local field is absent or null: the record takes no
    /// part in that relation.
    pub fn relation_key(&self, relation: &Relation, value: &Value) -> Result<Option<Key>> {
        let mut key = self.relation_prefix(relation);

        for field in &relation.local_fields {
            match value.get(field) {
                None | Some(Value::Null) => return Ok(None),
                Some(v) => key.push(part_of(field, v)?),
            }
        }

        for field in self.primary_key.fields() {
            let v = value
                .get(field)
                .ok_or_else(|| kvorm_core::Error::malformed_key(field, "field is missing"))?;
            key.push(part_of(field, v)?);
        }

        Ok(Some(key))
    }

    /// Literal prefix shared by every entry of a relation
    pub fn relation_prefix(&self, relation: &Relation) -> Key {
        Key::new(vec![KeyPart::from(format!(
            "{}_rel_{}",
            self.name, relation.name
        ))])
    }

    /// Value written at a relation key
    pub fn relation_value(&self, relation: &Relation, value: &Value) -> Value {
        match relation.storage {
            StorageMode::Reference => self.reference_value(value),
            StorageMode::Copy => value.clone(),
        }
    }
}

fn part_of(field: &str, value: &Value) -> Result<KeyPart> {
    KeyPart::try_from(value).map_err(|e| match e {
        kvorm_core::Error::MalformedKey { reason, .. } => {
            kvorm_core::Error::malformed_key(field, reason)
        }
        other => other,
    })
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EntityDescriptor`]
///
/// # Example
///
/// ```ignore
/// let user = EntityDescriptor::builder("users")
///     .index_on("email", ["email"], StorageMode::Reference)
///     .validator(ObjectSchema::new().required("id", FieldType::String))
///     .build()?;
/// ```
pub struct EntityBuilder {
    name: String,
    primary_key: Option<KeySchema>,
    indexes: Vec<SecondaryIndex>,
    relations: Vec<Relation>,
    validator: Arc<dyn Validator>,
}

impl EntityBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
            indexes: Vec::new(),
            relations: Vec::new(),
            validator: Arc::new(AcceptAll),
        }
    }

    /// Override the default `[name, id]` primary key
    pub fn primary_key(mut self, schema: KeySchema) -> Self {
        self.primary_key = Some(schema);
        self
    }

    /// Add a secondary index with an explicit key schema
    pub fn index(mut self, index: SecondaryIndex) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a secondary index keyed `[{entity}_by_{name}, fields..]`
    pub fn index_on<I, S>(mut self, name: impl Into<String>, fields: I, storage: StorageMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let key = fields.into_iter().fold(
            KeySchema::new().literal(format!("{}_by_{}", self.name, name)),
            |schema, field| schema.field(field),
        );
        self.indexes.push(SecondaryIndex::new(name, key, storage));
        self
    }

    /// Add a relation
    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Set the validator (default: accept everything)
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Validate and freeze the descriptor
    pub fn build(self) -> ModelResult<Entity> {
        let name = self.name;
        if name.trim().is_empty() {
            return Err(ModelError::invalid(name, "entity name must not be empty"));
        }

        let primary_key = self
            .primary_key
            .unwrap_or_else(|| KeySchema::new().literal(name.clone()).field("id"));
        if primary_key.field_count() == 0 {
            return Err(ModelError::invalid(
                name,
                "primary key needs at least one field segment",
            ));
        }

        for (i, index) in self.indexes.iter().enumerate() {
            if self.indexes[..i].iter().any(|other| other.name == index.name) {
                return Err(ModelError::invalid(
                    name,
                    format!("duplicate index '{}'", index.name),
                ));
            }
            if index.key.field_count() == 0 {
                return Err(ModelError::invalid(
                    name,
                    format!("index '{}' has no field segments", index.name),
                ));
            }
        }

        let mut relations = Vec::with_capacity(self.relations.len());
        for mut relation in self.relations {
            if relations.iter().any(|r: &Relation| r.name == relation.name) {
                return Err(ModelError::invalid(
                    name,
                    format!("duplicate relation '{}'", relation.name),
                ));
            }
            match relation.kind {
                RelationKind::ManyToOne => {
                    if relation.local_fields.is_empty() {
                        relation.local_fields = if relation.foreign_keys.is_empty() {
                            vec![format!("{}_id", relation.target)]
                        } else {
                            relation.foreign_keys.clone()
                        };
                    }
                }
                RelationKind::OneToMany | RelationKind::ManyToMany => {
                    if relation.kind == RelationKind::ManyToMany && relation.join_entity.is_none() {
                        return Err(ModelError::invalid(
                            name,
                            format!("many-to-many relation '{}' needs a join entity", relation.name),
                        ));
                    }
                    let key_fields: Vec<&str> = primary_key.fields().collect();
                    if relation.foreign_keys.is_empty() {
                        relation.foreign_keys = match key_fields.as_slice() {
                            [_] => vec![format!("{}_id", name)],
                            fields => fields.iter().map(|f| format!("{}_{}", name, f)).collect(),
                        };
                    } else if relation.foreign_keys.len() != key_fields.len() {
                        return Err(ModelError::invalid(
                            name,
                            format!(
                                "relation '{}' needs {} foreign-key fields, one per primary-key field",
                                relation.name,
                                key_fields.len()
                            ),
                        ));
                    }
                }
            }
            relations.push(relation);
        }

        Ok(Arc::new(EntityDescriptor {
            name,
            primary_key,
            indexes: self.indexes,
            relations,
            validator: self.validator,
        }))
    }
}
