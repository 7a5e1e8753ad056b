//! # logsync Store
//!
//! Message log and digest storage for logsync.
//!
//! The store keeps two relations per owner, the append-only message log and
//! the serialized Merkle digest, and updates both inside one owner-scoped
//! transaction. The sync coordinator depends only on the [`SyncStore`] and
//! [`OwnerTransaction`] traits.
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - ephemeral, for tests and single-process use
//! - [`JournalStore`] - durable, replayed from a CRC-framed commit journal
//!   on a [`LogBackend`] ([`FileLog`] or [`MemoryLog`])
//!
//! ## Isolation
//!
//! [`IsolationLevel::Serializable`] runs transactions for the same owner one
//! at a time; transactions for different owners run concurrently. Message
//! inserts rely on the `(owner, timestamp)` uniqueness rule, reported as an
//! [`InsertOutcome`] rather than an error.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod backend;
mod config;
mod error;
pub mod journal;
mod journal_store;
mod memory;
mod tables;
mod traits;

pub use backend::{FileLog, LogBackend, MemoryLog};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use journal::{CommitRecord, JournalEntry, JournalRecord, Replay, SchemaRecord};
pub use journal_store::{JournalStore, JOURNAL_FILE, LOCK_FILE};
pub use memory::MemoryStore;
pub use traits::{
    InsertOutcome, IsolationLevel, OwnerTransaction, StoreStats, SyncStore, SCHEMA_VERSION,
};
