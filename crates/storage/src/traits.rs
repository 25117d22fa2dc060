//! Store boundary traits
//!
//! [`KvStore`] is the interface every ordered key-value backend presents to
//! the mutation engine:
//!
//! - point reads returning the value with its versionstamp
//! - cursor-paginated prefix/range listing, forward or reverse
//! - one native atomic transaction primitive with compare-and-swap checks
//! - change notification for a set of watched keys
//!
//! The store is assumed to provide linearizable single-key operations and
//! atomic multi-key commits. Nothing above this trait takes locks.

use std::time::Duration;

use async_trait::async_trait;
use kvorm_core::{Error, Key, Limits, Result, Value, Versionstamp};

use crate::atomic::{AtomicOperation, CommitOutcome};

/// A stored key with its current value and versionstamp
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Full key
    pub key: Key,
    /// Current value
    pub value: Value,
    /// Versionstamp of the commit that last wrote the key
    pub versionstamp: Versionstamp,
}

/// Which keys a list call visits
#[derive(Debug, Clone, PartialEq)]
pub enum ListSelector {
    /// All keys strictly extending the prefix (the prefix key itself is excluded)
    Prefix(Key),
    /// Keys in `[start, end)`
    Range {
        /// Inclusive lower bound
        start: Key,
        /// Exclusive upper bound
        end: Key,
    },
}

impl ListSelector {
    /// Whether `key` falls inside this selector
    pub fn contains(&self, key: &Key) -> bool {
        match self {
            ListSelector::Prefix(prefix) => key.starts_with(prefix) && key.len() > prefix.len(),
            ListSelector::Range { start, end } => key >= start && key < end,
        }
    }
}

/// Pagination and direction for list calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Maximum entries per page (`None` = unbounded)
    pub limit: Option<usize>,
    /// Resume after the entry this cursor was produced for
    pub cursor: Option<String>,
    /// Iterate from the largest key down
    pub reverse: bool,
}

impl ListOptions {
    /// Set the page size
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume from a cursor
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Iterate in descending key order
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// One page of list results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    /// Entries in iteration order
    pub entries: Vec<Entry>,
    /// Cursor for the next page; `None` when the listing is exhausted
    pub cursor: Option<String>,
}

/// Options for single-key writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Relative expiry
    pub expire_in: Option<Duration>,
}

/// Stream of snapshots for a set of watched keys
#[async_trait]
pub trait WatchStream: Send {
    /// Wait for the next snapshot
    ///
    /// The first call returns the current entries immediately. Later calls
    /// return once any watched key's versionstamp changed. Returns `None`
    /// after the store closes.
    async fn next(&mut self) -> Result<Option<Vec<Option<Entry>>>>;
}

/// Ordered key-value store with atomic transactions
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one key
    async fn get(&self, key: &Key) -> Result<Option<Entry>>;

    /// Read several keys, preserving order
    async fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Entry>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// List one page of entries
    async fn list(&self, selector: &ListSelector, options: &ListOptions) -> Result<ListPage>;

    /// Commit an atomic transaction
    ///
    /// Returns `Ok(Rejected)` when a check failed. `Err` is reserved for
    /// limit violations, type errors and store failures.
    async fn commit(&self, operation: AtomicOperation) -> Result<CommitOutcome>;

    /// Watch a set of keys for changes
    async fn watch(&self, keys: Vec<Key>) -> Result<Box<dyn WatchStream>>;

    /// Size limits enforced by this store
    fn limits(&self) -> &Limits;

    /// Close the store; later operations fail with [`Error::Closed`]
    fn close(&self);

    /// Whether [`close`](KvStore::close) has been called
    fn is_closed(&self) -> bool;

    /// Start a new atomic transaction
    fn atomic(&self) -> AtomicOperation {
        AtomicOperation::new()
    }

    /// Write a single key unconditionally
    async fn set(&self, key: Key, value: Value, options: SetOptions) -> Result<Versionstamp> {
        let mut op = AtomicOperation::new();
        op.set_with_expiry(key, value, options.expire_in);
        match self.commit(op).await? {
            CommitOutcome::Committed { versionstamp } => Ok(versionstamp),
            CommitOutcome::Rejected => Err(Error::storage("unconditional write was rejected")),
        }
    }

    /// Delete a single key unconditionally
    async fn delete(&self, key: Key) -> Result<()> {
        let mut op = AtomicOperation::new();
        op.delete(key);
        match self.commit(op).await? {
            CommitOutcome::Committed { .. } => Ok(()),
            CommitOutcome::Rejected => Err(Error::storage("unconditional delete was rejected")),
        }
    }
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: KvStore + ?Sized> KvStore for std::sync::Arc<T> {
    async fn get(&self, key: &Key) -> Result<Option<Entry>> {
        (**self).get(key).await
    }

    async fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Entry>>> {
        (**self).get_many(keys).await
    }

    async fn list(&self, selector: &ListSelector, options: &ListOptions) -> Result<ListPage> {
        (**self).list(selector, options).await
    }

    async fn commit(&self, operation: AtomicOperation) -> Result<CommitOutcome> {
        (**self).commit(operation).await
    }

    async fn watch(&self, keys: Vec<Key>) -> Result<Box<dyn WatchStream>> {
        (**self).watch(keys).await
    }

    fn limits(&self) -> &Limits {
        (**self).limits()
    }

    fn close(&self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    async fn set(&self, key: Key, value: Value, options: SetOptions) -> Result<Versionstamp> {
        (**self).set(key, value, options).await
    }

    async fn delete(&self, key: Key) -> Result<()> {
        (**self).delete(key).await
    }
}

/// Drain every page of a listing
///
/// The page size in `options.limit` controls how many entries are fetched
/// per round trip; the result contains all of them.
pub async fn collect_list(
    store: &dyn KvStore,
    selector: &ListSelector,
    options: ListOptions,
) -> Result<Vec<Entry>> {
    let mut options = options;
    let mut out = Vec::new();
    loop {
        let page = store.list(selector, &options).await?;
        out.extend(page.entries);
        match page.cursor {
            Some(cursor) => options.cursor = Some(cursor),
            None => return Ok(out),
        }
    }
}
