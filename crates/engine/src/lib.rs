//! Atomic mutation engine for kvorm
//!
//! This crate turns a batch of logical intents into one all-or-nothing
//! store transaction:
//! - `MutationBuilder`: records create/update/delete and raw intents
//! - `MutationValidator`: pre-flight existence and schema checks
//! - `TransactionCompiler`: expands intents into guarded store operations,
//!   including derived index and relation maintenance
//! - `CommitCoordinator`: commit, timeout and retry policy
//! - `Counter` and helpers: guarded read-modify-write sugar
//! - `Database`: store handle, entity registry and configuration
//!
//! `commit()` never returns `Err`. Every outcome is a `TransactionResult`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod compiler;
pub mod config;
pub mod coordinator;
pub mod counter;
pub mod database;
pub mod error;
pub mod helpers;
pub mod lookup;
pub mod mutation;
pub mod options;
pub mod result;
pub mod validation;

pub use builder::MutationBuilder;
pub use compiler::{CompileFailure, TransactionCompiler};
pub use config::{CommitConfig, ConfigError, EngineConfig, LimitsConfig, CONFIG_FILE_NAME};
pub use coordinator::{CommitCoordinator, CommitPhase, CoordinatorMetrics};
pub use counter::Counter;
pub use database::Database;
pub use error::{MutationError, MutationResult};
pub use helpers::{compose, swap, transfer, upsert};
pub use lookup::{find_record, Record};
pub use mutation::{Lookup, Mutation, MutationKind, RawMutation};
pub use options::{CommitOptions, DEFAULT_MAX_MUTATIONS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
pub use result::{FailedMutation, TransactionResult};
pub use validation::MutationValidator;
