//! Transaction compiler
//!
//! Expands intents, in order, into one [`AtomicOperation`] that realizes all
//! of them or none:
//!
//! | Intent | Operations                                                              |
//! |--------|-------------------------------------------------------------------------|
//! | CREATE | absence guard + write on the primary key; absence guard + write per index entry; write per relation entry |
//! | UPDATE | versionstamp guard + write on the primary key; moved index entries deleted, absence-guarded and rewritten; changed relation entries moved |
//! | DELETE | versionstamp guard + delete on the primary key; delete per index entry; with cascade, relation entries and dependent records |
//! | SET    | write (optional expiry)                                                 |
//! | CHECK  | guard                                                                   |
//! | SUM/MIN/MAX | native unsigned aggregate                                          |
//!
//! Entity intents always pass through the entity validator so the stored
//! value is the normalized one, even when pre-flight validation is off.
//! UPDATE and DELETE read the current record on every compile, so a retry
//! compiles against fresh state.
//!
//! Cascade is one level deep and best-effort: a dependent entity that cannot
//! be resolved or listed is skipped with a warning, and dependents that do
//! not fit the store's operation budget are left in place.

use kvorm_core::{Key, KeyPart, Value};
use kvorm_model::{EntityDescriptor, Registry, RelationKind};
use kvorm_storage::{collect_list, AtomicOperation, KvStore, ListOptions, ListSelector};
use tracing::{debug, warn};

use crate::error::{MutationError, MutationResult};
use crate::lookup::{find_record, Record};
use crate::mutation::{Lookup, Mutation};
use crate::validation::{normalize, require_lookup, require_object};

/// Page size used when listing dependents during cascade
const CASCADE_PAGE_SIZE: usize = 100;

/// Compilation failure, pinned to an intent when possible
#[derive(Debug, Clone, PartialEq)]
pub struct CompileFailure {
    /// Failing intent; `None` for batch-level failures
    pub index: Option<usize>,
    /// Cause
    pub error: MutationError,
}

/// Builds store transactions from intents
pub struct TransactionCompiler<'a> {
    store: &'a dyn KvStore,
    registry: Option<&'a Registry>,
}

impl<'a> TransactionCompiler<'a> {
    /// Compiler reading current state from `store`
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self {
            store,
            registry: None,
        }
    }

    /// Resolve cascade targets through `registry`
    pub fn with_registry(mut self, registry: &'a Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Compile a batch into one atomic operation
    pub async fn compile(&self, mutations: &[Mutation]) -> Result<AtomicOperation, CompileFailure> {
        let mut op = AtomicOperation::new();

        for (index, mutation) in mutations.iter().enumerate() {
            self.compile_one(mutation, &mut op)
                .await
                .map_err(|error| CompileFailure {
                    index: Some(index),
                    error,
                })?;
        }

        let max = self.store.limits().max_operations;
        if op.len() > max {
            return Err(CompileFailure {
                index: None,
                error: MutationError::TransactionTooLarge {
                    operations: op.len(),
                    max,
                },
            });
        }

        debug!(
            target: "kvorm::txn",
            intents = mutations.len(),
            checks = op.checks().len(),
            operations = op.operations().len(),
            "Compiled transaction"
        );
        Ok(op)
    }

    async fn compile_one(&self, mutation: &Mutation, op: &mut AtomicOperation) -> MutationResult<()> {
        match mutation {
            Mutation::Create { entity, data } => compile_create(entity, data, op),
            Mutation::Update {
                entity,
                key,
                data,
                merge,
            } => self.compile_update(entity, key, data, *merge, op).await,
            Mutation::Delete {
                entity,
                key,
                cascade,
            } => self.compile_delete(entity, key, *cascade, op).await,
            Mutation::Set {
                key,
                value,
                expire_in,
            } => {
                op.set_with_expiry(key.clone(), value.clone(), *expire_in);
                Ok(())
            }
            Mutation::Check { key, versionstamp } => {
                op.check(key.clone(), *versionstamp);
                Ok(())
            }
            Mutation::Sum { key, value } => {
                op.sum(key.clone(), *value);
                Ok(())
            }
            Mutation::Min { key, value } => {
                op.min(key.clone(), *value);
                Ok(())
            }
            Mutation::Max { key, value } => {
                op.max(key.clone(), *value);
                Ok(())
            }
        }
    }

    async fn current(&self, entity: &EntityDescriptor, lookup: &Lookup) -> MutationResult<Record> {
        find_record(self.store, entity, lookup)
            .await?
            .ok_or_else(|| MutationError::NotFound {
                entity: entity.name().to_string(),
                lookup: lookup.to_string(),
            })
    }

    async fn compile_update(
        &self,
        entity: &EntityDescriptor,
        lookup: &Lookup,
        data: &Value,
        merge: bool,
        op: &mut AtomicOperation,
    ) -> MutationResult<()> {
        require_lookup(lookup, "update")?;
        require_object(data, "update")?;

        let record = self.current(entity, lookup).await?;
        let candidate = if merge {
            record.value.merged(data)
        } else {
            data.clone()
        };
        let value = normalize(entity, &candidate)?;

        let new_key = entity.primary_key_of(&value)?;
        if new_key != record.key {
            return Err(MutationError::PrimaryKeyChanged {
                entity: entity.name().to_string(),
                from: record.key,
                to: new_key,
            });
        }

        op.check(record.key.clone(), Some(record.versionstamp))
            .set(record.key.clone(), value.clone());

        for index in entity.indexes() {
            // Records written before an index existed may not derive an old key.
            let old_key = entity.index_entry_key(index, &record.value).ok().flatten();
            let new_key = entity.index_entry_key(index, &value)?;
            let stored = entity.index_value(index, &value);

            if old_key == new_key {
                if let Some(key) = new_key {
                    if entity.index_value(index, &record.value) != stored {
                        op.set(key, stored);
                    }
                }
            } else {
                if let Some(old) = old_key {
                    op.delete(old);
                }
                if let Some(new) = new_key {
                    op.check(new.clone(), None).set(new, stored);
                }
            }
        }

        for relation in entity.relations() {
            let old_key = entity.relation_key(relation, &record.value).ok().flatten();
            let new_key = entity.relation_key(relation, &value)?;
            let stored = entity.relation_value(relation, &value);

            if old_key == new_key {
                if let Some(key) = new_key {
                    if entity.relation_value(relation, &record.value) != stored {
                        op.set(key, stored);
                    }
                }
            } else {
                if let Some(old) = old_key {
                    op.delete(old);
                }
                if let Some(new) = new_key {
                    op.set(new, stored);
                }
            }
        }

        Ok(())
    }

    async fn compile_delete(
        &self,
        entity: &EntityDescriptor,
        lookup: &Lookup,
        cascade: bool,
        op: &mut AtomicOperation,
    ) -> MutationResult<()> {
        require_lookup(lookup, "delete")?;

        let record = self.current(entity, lookup).await?;
        op.check(record.key.clone(), Some(record.versionstamp))
            .delete(record.key.clone());

        for index in entity.indexes() {
            if let Ok(Some(key)) = entity.index_entry_key(index, &record.value) {
                op.delete(key);
            }
        }

        if cascade {
            self.cascade(entity, &record, op).await;
        }
        Ok(())
    }

    /// Remove relation entries and one level of dependent records
    async fn cascade(&self, entity: &EntityDescriptor, record: &Record, op: &mut AtomicOperation) {
        let budget = self.store.limits().max_operations;

        for relation in entity.relations() {
            if let Ok(Some(key)) = entity.relation_key(relation, &record.value) {
                op.delete(key);
            }

            let dependent_name = match relation.kind {
                RelationKind::ManyToOne => continue,
                RelationKind::OneToMany if !relation.cascade => continue,
                RelationKind::OneToMany => relation.target.as_str(),
                RelationKind::ManyToMany => match relation.join_entity.as_deref() {
                    Some(join) => join,
                    None => continue,
                },
            };
            if relation.foreign_keys.is_empty() {
                continue;
            }

            let Some(registry) = self.registry else {
                warn!(
                    target: "kvorm::txn",
                    entity = entity.name(),
                    relation = %relation.name,
                    "Cascade skipped: no registry to resolve dependents"
                );
                continue;
            };
            let dependent = match registry.resolve(dependent_name) {
                Ok(dependent) => dependent,
                Err(e) => {
                    warn!(target: "kvorm::txn", relation = %relation.name, error = %e, "Cascade skipped");
                    continue;
                }
            };

            let link = entity.key_values(&record.value);
            let records = match self
                .find_dependents(&dependent, &relation.foreign_keys, &link)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        target: "kvorm::txn",
                        relation = %relation.name,
                        dependent = dependent.name(),
                        error = %e,
                        "Cascade skipped: dependents could not be listed"
                    );
                    continue;
                }
            };

            for dependent_record in records {
                if dependent_record.key == record.key {
                    continue;
                }
                let owned = owned_keys(&dependent, &dependent_record.value);
                // guard + primary delete + owned entries
                if op.len() + 2 + owned.len() > budget {
                    warn!(
                        target: "kvorm::txn",
                        relation = %relation.name,
                        dependent = %dependent_record.key,
                        "Cascade stopped: transaction budget exhausted"
                    );
                    return;
                }
                op.check(dependent_record.key.clone(), Some(dependent_record.versionstamp))
                    .delete(dependent_record.key);
                for key in owned {
                    op.delete(key);
                }
            }
        }
    }

    /// Records of `dependent` whose `foreign_keys` fields equal `link`
    ///
    /// `link` holds the owner's primary-key values in key order. Uses the
    /// dependent's MANY_TO_ONE relation on those fields when one exists,
    /// otherwise scans every record of the dependent entity.
    async fn find_dependents(
        &self,
        dependent: &EntityDescriptor,
        foreign_keys: &[String],
        link: &[Value],
    ) -> MutationResult<Vec<Record>> {
        let back = dependent
            .relations()
            .iter()
            .find(|r| r.kind == RelationKind::ManyToOne && r.local_fields == foreign_keys);

        if let Some(back) = back {
            let mut prefix = dependent.relation_prefix(back);
            for value in link {
                prefix.push(KeyPart::try_from(value)?);
            }
            let entries = collect_list(
                self.store,
                &ListSelector::Prefix(prefix),
                ListOptions::default().with_limit(CASCADE_PAGE_SIZE),
            )
            .await?;
            let keys = entries
                .iter()
                .map(|entry| dependent.primary_key_of(&entry.value))
                .collect::<Result<Vec<Key>, _>>()?;
            let current = self.store.get_many(&keys).await?;
            return Ok(current.into_iter().flatten().map(Record::from).collect());
        }

        let entries = collect_list(
            self.store,
            &ListSelector::Prefix(dependent.record_prefix()),
            ListOptions::default().with_limit(CASCADE_PAGE_SIZE),
        )
        .await?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                foreign_keys
                    .iter()
                    .zip(link)
                    .all(|(field, value)| entry.value.get(field) == Some(value))
            })
            .map(Record::from)
            .collect())
    }
}

fn compile_create(entity: &EntityDescriptor, data: &Value, op: &mut AtomicOperation) -> MutationResult<()> {
    require_object(data, "create")?;
    let value = normalize(entity, data)?;
    let key = entity.primary_key_of(&value)?;

    op.check(key.clone(), None).set(key, value.clone());

    for index in entity.indexes() {
        if let Some(key) = entity.index_entry_key(index, &value)? {
            op.check(key.clone(), None)
                .set(key, entity.index_value(index, &value));
        }
    }

    for relation in entity.relations() {
        if let Some(key) = entity.relation_key(relation, &value)? {
            op.set(key, entity.relation_value(relation, &value));
        }
    }

    Ok(())
}

/// Index and relation keys derived from a stored value
fn owned_keys(entity: &EntityDescriptor, value: &Value) -> Vec<Key> {
    let indexes = entity
        .indexes()
        .iter()
        .filter_map(|index| entity.index_entry_key(index, value).ok().flatten());
    let relations = entity
        .relations()
        .iter()
        .filter_map(|relation| entity.relation_key(relation, value).ok().flatten());
    indexes.chain(relations).collect()
}
