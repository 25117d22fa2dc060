//! Mutation Engine Integration Tests
//!
//! End-to-end behavior of batches committed through the public API:
//! validation ordering, derived indexes, retry and timeout policy,
//! counters and cascade deletes.

#[path = "../common/mod.rs"]
mod common;

mod cascade;
mod counters;
mod indexes;
mod raw_intents;
mod retry;
mod validation;
