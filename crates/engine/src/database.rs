//! Database handle: store, registry and configuration
//!
//! A `Database` ties one store handle to the registry of entities declared
//! against it and the configured commit defaults. Every builder and counter
//! it hands out shares the same coordinator, so metrics cover all commits
//! made through the handle.
//!
//! The registry lives and dies with the handle: `close()` clears it and
//! closes the store. There is no process-wide instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kvorm_core::{Error, Key, Value};
use kvorm_model::{Entity, EntityDescriptor, Registry};
use kvorm_storage::{KvStore, ListOptions, ListPage, ListSelector, MemoryStore};
use tracing::info;

use crate::builder::MutationBuilder;
use crate::config::{ConfigError, EngineConfig};
use crate::coordinator::{CommitCoordinator, CoordinatorMetrics};
use crate::counter::Counter;
use crate::error::MutationResult;
use crate::helpers;
use crate::lookup::{find_record, Record};
use crate::mutation::Lookup;
use crate::result::TransactionResult;

/// Open handle over one store
pub struct Database {
    store: Arc<dyn KvStore>,
    registry: Arc<Registry>,
    coordinator: Arc<CommitCoordinator>,
    config: EngineConfig,
    /// Cleared by `close()`; checked before registry changes
    open: AtomicBool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("entities", &self.registry.names())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open over `store` with default configuration
    pub fn open(store: Arc<dyn KvStore>) -> Self {
        Self::build(store, EngineConfig::default())
    }

    /// Open over `store` with explicit configuration
    pub fn open_with_config(store: Arc<dyn KvStore>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    /// Open over a fresh in-memory store sized by `config.limits`
    pub fn in_memory(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let store = MemoryStore::with_limits(config.limits());
        Ok(Self::build(Arc::new(store), config))
    }

    fn build(store: Arc<dyn KvStore>, config: EngineConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let coordinator = Arc::new(
            CommitCoordinator::new(Arc::clone(&store)).with_registry(Arc::clone(&registry)),
        );
        info!(
            target: "kvorm::db",
            max_mutations = config.commit.max_mutations,
            max_operations = store.limits().max_operations,
            "Database opened"
        );
        Self {
            store,
            registry,
            coordinator,
            config,
            open: AtomicBool::new(true),
        }
    }

    fn check_open(&self) -> MutationResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Closed.into())
        }
    }

    /// Whether `close()` has not been called
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Entities declared against this database
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Counters of every commit made through this handle
    pub fn metrics(&self) -> CoordinatorMetrics {
        self.coordinator.metrics()
    }

    /// Declare an entity
    pub fn register(&self, entity: Entity) -> MutationResult<Entity> {
        self.check_open()?;
        self.registry.register(Arc::clone(&entity))?;
        Ok(entity)
    }

    /// Look up a declared entity by name
    pub fn entity(&self, name: &str) -> MutationResult<Entity> {
        Ok(self.registry.resolve(name)?)
    }

    /// Empty builder using the configured commit defaults
    pub fn mutation(&self) -> MutationBuilder {
        MutationBuilder::with_coordinator(Arc::clone(&self.coordinator))
            .with_options(self.config.commit_options())
    }

    /// Counter at `key`
    pub fn counter(&self, key: Key) -> Counter {
        Counter::with_coordinator(Arc::clone(&self.coordinator), key)
            .with_options(self.config.commit_options())
    }

    /// Read the record `lookup` finds
    pub async fn find(&self, entity: &EntityDescriptor, lookup: impl Into<Lookup>) -> MutationResult<Option<Record>> {
        find_record(self.store.as_ref(), entity, &lookup.into()).await
    }

    /// List one page of an entity's records in primary-key order
    pub async fn list(&self, entity: &EntityDescriptor, options: &ListOptions) -> MutationResult<ListPage> {
        let selector = ListSelector::Prefix(entity.record_prefix());
        Ok(self.store.list(&selector, options).await?)
    }

    /// Merge into the record `lookup` finds, or create it from `data`
    pub async fn upsert(
        &self,
        entity: &Entity,
        lookup: impl Into<Lookup>,
        data: impl Into<Value>,
    ) -> TransactionResult {
        helpers::upsert(
            &self.coordinator,
            entity,
            &lookup.into(),
            &data.into(),
            &self.config.commit_options(),
        )
        .await
    }

    /// Clear the registry and close the store
    ///
    /// Later commits fail with a store `Closed` error. Closing twice is a
    /// no-op.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.registry.clear();
            self.store.close();
            info!(target: "kvorm::db", "Database closed");
        }
    }
}
