//! MemoryStore: ordered in-memory backend with atomic transactions
//!
//! This module implements the [`KvStore`] trait using:
//! - `BTreeMap<Key, StoredValue>` for ordered key storage with expiry
//! - `parking_lot::RwLock` for thread-safe access
//! - `AtomicU64` for monotonically increasing versionstamps
//! - `tokio::sync::watch` to wake watchers after every commit
//!
//! # Design Notes
//!
//! - **No version history**: Each key stores only its latest value
//! - **Logical expiry**: Expired values are filtered at read time, not deleted
//! - **All-or-nothing commit**: checks are evaluated and every mutation is
//!   staged before anything is applied, so a type error in the last
//!   operation leaves the map untouched
//! - **Versionstamp allocated under the write lock**: commit order and
//!   versionstamp order always agree

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, trace};

use kvorm_core::{Error, Key, Limits, Result, Value, Versionstamp};

use crate::atomic::{AtomicOperation, CommitOutcome, Operation};
use crate::stored_value::StoredValue;
use crate::traits::{Entry, KvStore, ListOptions, ListPage, ListSelector, WatchStream};

/// Shared state behind every clone of a [`MemoryStore`]
#[derive(Debug)]
struct StoreInner {
    /// The main data store: ordered map from Key to StoredValue
    data: RwLock<BTreeMap<Key, StoredValue>>,
    /// Last allocated versionstamp
    version: AtomicU64,
    limits: Limits,
    closed: AtomicBool,
    /// Latest committed versionstamp, observed by watchers
    changes: watch::Sender<Versionstamp>,
}

impl StoreInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn read(&self, key: &Key, now: Instant) -> Option<Entry> {
        let data = self.data.read();
        data.get(key)
            .filter(|sv| !sv.is_expired(now))
            .map(|sv| sv.to_entry(key))
    }

    fn read_many(&self, keys: &[Key], now: Instant) -> Vec<Option<Entry>> {
        let data = self.data.read();
        keys.iter()
            .map(|key| {
                data.get(key)
                    .filter(|sv| !sv.is_expired(now))
                    .map(|sv| sv.to_entry(key))
            })
            .collect()
    }
}

/// Ordered in-memory store
///
/// Cloning is cheap: every clone shares the same data, version counter and
/// watchers.
///
/// # Example
///
/// ```ignore
/// let store = MemoryStore::new();
/// let mut op = store.atomic();
/// op.check(key!["users", "u1"], None).set(key!["users", "u1"], value);
/// let outcome = store.commit(op).await?;
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty store with default limits
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    /// Create a new empty store with custom limits
    pub fn with_limits(limits: Limits) -> Self {
        let (changes, _) = watch::channel(Versionstamp::ZERO);
        Self {
            inner: Arc::new(StoreInner {
                data: RwLock::new(BTreeMap::new()),
                version: AtomicU64::new(0),
                limits,
                closed: AtomicBool::new(false),
                changes,
            }),
        }
    }

    /// Latest committed versionstamp (ZERO before the first commit)
    pub fn current_versionstamp(&self) -> Versionstamp {
        Versionstamp::new(self.inner.version.load(Ordering::Acquire))
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .data
            .read()
            .values()
            .filter(|sv| !sv.is_expired(now))
            .count()
    }

    /// True when no live keys are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate_operation(&self, operation: &AtomicOperation) -> Result<()> {
        let limits = &self.inner.limits;
        limits.validate_operation_count(operation.len())?;
        for check in operation.checks() {
            limits.validate_key(&check.key)?;
        }
        for op in operation.operations() {
            limits.validate_key(op.key())?;
            if let Operation::Set { value, .. } = op {
                limits.validate_value(value)?;
            }
        }
        Ok(())
    }

    /// Apply every operation to a staging map without touching `data`
    ///
    /// Returns the final state of every written key (`None` = deleted).
    fn stage(
        data: &BTreeMap<Key, StoredValue>,
        operation: &AtomicOperation,
        versionstamp: Versionstamp,
        now: Instant,
    ) -> Result<BTreeMap<Key, Option<StoredValue>>> {
        let mut staged: BTreeMap<Key, Option<StoredValue>> = BTreeMap::new();

        for op in operation.operations() {
            let key = op.key();
            let current: Option<Value> = match staged.get(key) {
                Some(state) => state.as_ref().map(|sv| sv.value().clone()),
                None => data
                    .get(key)
                    .filter(|sv| !sv.is_expired(now))
                    .map(|sv| sv.value().clone()),
            };

            let next = match op {
                Operation::Set {
                    value, expire_in, ..
                } => Some(StoredValue::new(value.clone(), versionstamp, *expire_in, now)),
                Operation::Delete { .. } => None,
                Operation::Sum { value, .. } => {
                    let base = counter_value(current.as_ref())?.unwrap_or(0);
                    Some(StoredValue::new(
                        Value::U64(base.wrapping_add(*value)),
                        versionstamp,
                        None,
                        now,
                    ))
                }
                Operation::Min { value, .. } => {
                    let result = counter_value(current.as_ref())?.map_or(*value, |c| c.min(*value));
                    Some(StoredValue::new(Value::U64(result), versionstamp, None, now))
                }
                Operation::Max { value, .. } => {
                    let result = counter_value(current.as_ref())?.map_or(*value, |c| c.max(*value));
                    Some(StoredValue::new(Value::U64(result), versionstamp, None, now))
                }
            };
            staged.insert(key.clone(), next);
        }

        Ok(staged)
    }
}

/// Interpret the current value of an aggregate target
fn counter_value(current: Option<&Value>) -> Result<Option<u64>> {
    match current {
        None => Ok(None),
        Some(Value::U64(n)) => Ok(Some(*n)),
        Some(other) => Err(Error::TypeMismatch {
            expected: "U64",
            actual: other.type_name(),
        }),
    }
}

fn encode_cursor(key: &Key) -> Result<String> {
    let bytes = serde_json::to_vec(key)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_cursor(cursor: &str) -> Result<Key> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| Error::InvalidCursor(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::InvalidCursor(e.to_string()))
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &Key) -> Result<Option<Entry>> {
        self.inner.ensure_open()?;
        Ok(self.inner.read(key, Instant::now()))
    }

    async fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Entry>>> {
        self.inner.ensure_open()?;
        Ok(self.inner.read_many(keys, Instant::now()))
    }

    async fn list(&self, selector: &ListSelector, options: &ListOptions) -> Result<ListPage> {
        self.inner.ensure_open()?;
        let after = options.cursor.as_deref().map(decode_cursor).transpose()?;
        let now = Instant::now();

        let mut entries: Vec<Entry> = {
            let data = self.inner.data.read();
            let candidates: Box<dyn Iterator<Item = (&Key, &StoredValue)>> = match selector {
                ListSelector::Prefix(prefix) => Box::new(
                    data.range(prefix.clone()..)
                        .take_while(|(k, _)| k.starts_with(prefix)),
                ),
                ListSelector::Range { start, end } if start < end => {
                    Box::new(data.range(start.clone()..end.clone()))
                }
                ListSelector::Range { .. } => Box::new(std::iter::empty()),
            };
            candidates
                .filter(|(k, sv)| selector.contains(k) && !sv.is_expired(now))
                .filter(|(k, _)| match &after {
                    Some(after) if options.reverse => *k < after,
                    Some(after) => *k > after,
                    None => true,
                })
                .map(|(k, sv)| sv.to_entry(k))
                .collect()
        };

        if options.reverse {
            entries.reverse();
        }

        let mut cursor = None;
        if let Some(limit) = options.limit {
            if entries.len() > limit {
                entries.truncate(limit);
                if let Some(last) = entries.last() {
                    cursor = Some(encode_cursor(&last.key)?);
                }
            }
        }

        trace!(target: "kvorm::store", returned = entries.len(), more = cursor.is_some(), "list");
        Ok(ListPage { entries, cursor })
    }

    async fn commit(&self, operation: AtomicOperation) -> Result<CommitOutcome> {
        self.inner.ensure_open()?;
        self.validate_operation(&operation)?;
        let now = Instant::now();

        let versionstamp = {
            let mut data = self.inner.data.write();

            for check in operation.checks() {
                let current = data
                    .get(&check.key)
                    .filter(|sv| !sv.is_expired(now))
                    .map(StoredValue::versionstamp);
                if current != check.versionstamp {
                    debug!(
                        target: "kvorm::store",
                        key = %check.key,
                        expected = ?check.versionstamp,
                        actual = ?current,
                        "Atomic check failed"
                    );
                    return Ok(CommitOutcome::Rejected);
                }
            }

            let versionstamp =
                Versionstamp::new(self.inner.version.load(Ordering::Acquire)).next();
            let staged = Self::stage(&data, &operation, versionstamp, now)?;
            self.inner
                .version
                .store(versionstamp.as_u64(), Ordering::Release);

            for (key, state) in staged {
                match state {
                    Some(sv) => {
                        data.insert(key, sv);
                    }
                    None => {
                        data.remove(&key);
                    }
                }
            }
            versionstamp
        };

        self.inner.changes.send_replace(versionstamp);
        trace!(
            target: "kvorm::store",
            %versionstamp,
            checks = operation.checks().len(),
            operations = operation.operations().len(),
            "Atomic commit applied"
        );
        Ok(CommitOutcome::Committed { versionstamp })
    }

    async fn watch(&self, keys: Vec<Key>) -> Result<Box<dyn WatchStream>> {
        self.inner.ensure_open()?;
        Ok(Box::new(MemoryWatch {
            inner: Arc::clone(&self.inner),
            changes: self.inner.changes.subscribe(),
            keys,
            last: None,
        }))
    }

    fn limits(&self) -> &Limits {
        &self.inner.limits
    }

    fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!(target: "kvorm::store", "Memory store closed");
            // Wake watchers so they can observe the closed flag.
            let current = *self.inner.changes.borrow();
            self.inner.changes.send_replace(current);
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Watch stream over a [`MemoryStore`]
struct MemoryWatch {
    inner: Arc<StoreInner>,
    changes: watch::Receiver<Versionstamp>,
    keys: Vec<Key>,
    last: Option<Vec<Option<Versionstamp>>>,
}

#[async_trait]
impl WatchStream for MemoryWatch {
    async fn next(&mut self) -> Result<Option<Vec<Option<Entry>>>> {
        loop {
            if self.inner.closed.load(Ordering::Acquire) {
                return Ok(None);
            }

            // Mark the current commit as seen before reading so that a commit
            // landing after the read always wakes the next `changed()`.
            self.changes.borrow_and_update();
            let snapshot = self.inner.read_many(&self.keys, Instant::now());
            let stamps: Vec<Option<Versionstamp>> = snapshot
                .iter()
                .map(|e| e.as_ref().map(|e| e.versionstamp))
                .collect();

            if self.last.as_ref() != Some(&stamps) {
                self.last = Some(stamps);
                return Ok(Some(snapshot));
            }

            if self.changes.changed().await.is_err() {
                return Ok(None);
            }
        }
    }
}
