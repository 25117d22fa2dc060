//! Storage layer for kvorm
//!
//! This crate defines the boundary between the mutation engine and an
//! ordered key-value backend:
//! - KvStore: point reads, paginated listing, atomic commits, watch
//! - AtomicOperation: CAS checks plus set/delete/sum/min/max mutations
//! - MemoryStore: BTreeMap-based reference backend with RwLock
//!
//! # Atomicity
//!
//! A commit either applies every mutation under one new versionstamp or
//! applies nothing. Failed checks are reported as
//! [`CommitOutcome::Rejected`], never as an error.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod memory;
mod stored_value;
pub mod traits;

pub use atomic::{AtomicOperation, Check, CommitOutcome, Operation};
pub use memory::MemoryStore;
pub use traits::{
    collect_list, Entry, KvStore, ListOptions, ListPage, ListSelector, SetOptions, WatchStream,
};
