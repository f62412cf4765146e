//! # Tessera Store
//!
//! Transactional storage for sync bookkeeping (clients, client groups) and
//! puzzle progress rows.
//!
//! The [`Store`] trait exposes closure-scoped transactions: everything done
//! through the [`StoreTxn`] handle commits atomically or not at all. The
//! bundled [`MemoryStore`] uses optimistic concurrency and re-runs the
//! closure when a concurrent commit touched a row it read.
//!
//! Monotonicity invariants are enforced on every write:
//! - a client's `last_mutation_id` never decreases
//! - a client never changes group
//! - a group's owner never changes and its `cvr_version` never decreases

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod error;
mod memory;
mod records;
mod store;

pub use catalog::{MemoryCatalog, PuzzleCatalog};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreStats, DEFAULT_MAX_RETRIES};
pub use records::{ClientGroupRecord, ClientRecord, ProgressRecord};
pub use store::{Store, StoreTxn};
