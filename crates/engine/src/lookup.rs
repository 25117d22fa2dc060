//! Record lookup by primary key or secondary index

use kvorm_core::{Key, Value, Versionstamp};
use kvorm_model::{EntityDescriptor, SecondaryIndex};
use kvorm_storage::{collect_list, Entry, KvStore, ListOptions, ListSelector};
use tracing::debug;

use crate::error::{MutationError, MutationResult};
use crate::mutation::Lookup;

const SCAN_PAGE_SIZE: usize = 100;

/// A record read from its primary key
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Primary key
    pub key: Key,
    /// Current value
    pub value: Value,
    /// Versionstamp of the primary-key entry
    pub versionstamp: Versionstamp,
}

impl From<Entry> for Record {
    fn from(entry: Entry) -> Self {
        Self {
            key: entry.key,
            value: entry.value,
            versionstamp: entry.versionstamp,
        }
    }
}

/// Find the current record an UPDATE or DELETE refers to
///
/// Index lookups always finish with a read of the primary key, so the
/// returned versionstamp is the one a compare-and-swap guard must use.
/// COPY entries and primary-key REFERENCE entries rebuild the key directly;
/// an index designating another field is resolved by scanning the entity's
/// records for the one that owns the entry.
pub async fn find_record(
    store: &dyn KvStore,
    entity: &EntityDescriptor,
    lookup: &Lookup,
) -> MutationResult<Option<Record>> {
    let primary = match lookup {
        Lookup::Primary(value) => entity.primary_key_of(value)?,
        Lookup::Index { index, value } => {
            let idx = entity
                .index(index)
                .ok_or_else(|| MutationError::UnknownIndex {
                    entity: entity.name().to_string(),
                    index: index.clone(),
                })?;
            let index_key = entity.index_key(idx, value)?;
            let Some(entry) = store.get(&index_key).await? else {
                return Ok(None);
            };
            if !entity.index_resolves_key(idx) {
                return scan_for_owner(store, entity, idx, &index_key, &entry.value).await;
            }
            entity.primary_key_of(&entry.value)?
        }
    };

    Ok(store.get(&primary).await?.map(Record::from))
}

async fn scan_for_owner(
    store: &dyn KvStore,
    entity: &EntityDescriptor,
    index: &SecondaryIndex,
    index_key: &Key,
    stored: &Value,
) -> MutationResult<Option<Record>> {
    debug!(
        target: "kvorm::txn",
        entity = entity.name(),
        index = %index.name,
        "Resolving designated-field index by scan"
    );
    let entries = collect_list(
        store,
        &ListSelector::Prefix(entity.record_prefix()),
        ListOptions::default().with_limit(SCAN_PAGE_SIZE),
    )
    .await?;

    Ok(entries
        .into_iter()
        .find(|entry| {
            matches!(entity.index_entry_key(index, &entry.value), Ok(Some(ref key)) if key == index_key)
                && entity.index_value(index, &entry.value) == *stored
        })
        .map(Record::from))
}
