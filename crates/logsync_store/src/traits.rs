//! The storage collaborator the sync coordinator runs against.
//!
//! Two relations are kept per owner:
//!
//! - `message(timestamp, owner, content)`: append-only, unique on
//!   `(owner, timestamp)`; inserting an existing identity is a no-op
//! - `merkle_tree(owner, serialized)`: at most one row per owner, upserted
//!
//! Both are written together inside one [`OwnerTransaction`], so a committed
//! digest always describes exactly the committed messages.

use crate::error::{StoreError, StoreResult};
use bytes::Bytes;
use logsync_protocol::{Message, NodeId, OwnerId, Timestamp};
use serde::Serialize;

/// Schema version created by [`SyncStore::setup`].
pub const SCHEMA_VERSION: u32 = 1;

/// Isolation requested for an owner transaction.
///
/// The digest row is read, modified and written back inside the
/// transaction, so only serializable isolation is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Transactions for the same owner run one at a time.
    #[default]
    Serializable,
}

/// Whether an insert added a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The message was new.
    Inserted,
    /// A message with the same identity already existed.
    Duplicate,
}

impl InsertOutcome {
    /// Returns `true` if a row was added.
    #[must_use]
    pub fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Row counts for tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Owners with at least one message or digest row.
    pub owners: usize,
    /// Messages across all owners.
    pub messages: usize,
    /// Digest rows.
    pub trees: usize,
    /// Committed transactions that wrote something.
    pub commits: u64,
    /// Bytes of durable journal, zero for ephemeral stores.
    pub journal_bytes: u64,
}

/// Writes and reads scoped to one owner inside a transaction.
///
/// Reads observe the transaction's own pending writes.
pub trait OwnerTransaction {
    /// The owner this transaction is scoped to.
    fn owner(&self) -> &OwnerId;

    /// Loads the owner's serialized digest, if a row exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_tree(&self) -> StoreResult<Option<String>>;

    /// Inserts a message unless one with the same timestamp exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written. A duplicate is not
    /// an error.
    fn insert_message(&mut self, timestamp: Timestamp, content: Bytes)
        -> StoreResult<InsertOutcome>;

    /// Inserts or replaces the owner's digest row.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn upsert_tree(&mut self, serialized: String) -> StoreResult<()>;
}

/// A transactional store holding both relations.
pub trait SyncStore: Send + Sync {
    /// Creates the schema if needed and returns its version. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaMismatch`] if the store was created with
    /// an incompatible schema.
    fn setup(&self) -> StoreResult<u32>;

    /// Runs `f` in a transaction scoped to `owner`.
    ///
    /// If `f` returns `Ok` its writes are committed atomically. If `f`
    /// returns `Err`, or the commit fails, nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a commit failure converted into `E`.
    fn transaction<T, E, F>(&self, owner: &OwnerId, isolation: IsolationLevel, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut dyn OwnerTransaction) -> Result<T, E>,
        E: From<StoreError>;

    /// Committed messages for `owner` with `timestamp >= since`, skipping
    /// those authored by `exclude_node`, ascending by timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn messages_since(
        &self,
        owner: &OwnerId,
        since: &Timestamp,
        exclude_node: NodeId,
    ) -> StoreResult<Vec<Message>>;

    /// The committed digest row for `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_tree(&self, owner: &OwnerId) -> StoreResult<Option<String>>;

    /// Every owner with data, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn owners(&self) -> StoreResult<Vec<OwnerId>>;

    /// Every committed message for `owner`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn messages(&self, owner: &OwnerId) -> StoreResult<Vec<Message>>;

    /// Row counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn stats(&self) -> StoreResult<StoreStats>;
}
