//! Ephemeral store for tests and single-process deployments.

use crate::error::{StoreError, StoreResult};
use crate::tables::Tables;
use crate::traits::{
    IsolationLevel, OwnerTransaction, StoreStats, SyncStore, SCHEMA_VERSION,
};
use logsync_protocol::{Message, NodeId, OwnerId, Timestamp};
use parking_lot::RwLock;

/// A store that keeps both relations in memory.
///
/// # Example
///
/// ```rust
/// use logsync_store::{InsertOutcome, IsolationLevel, MemoryStore, SyncStore};
/// use logsync_protocol::{NodeId, OwnerId, Timestamp};
///
/// let store = MemoryStore::new();
/// store.setup().unwrap();
///
/// let owner = OwnerId::new("u1").unwrap();
/// let ts = Timestamp::new(1_000, 0, NodeId::new(1)).unwrap();
/// let outcome = store
///     .transaction(&owner, IsolationLevel::Serializable, |txn| {
///         txn.insert_message(ts, "hello".into())
///     })
///     .unwrap();
/// assert_eq!(outcome, InsertOutcome::Inserted);
/// assert_eq!(store.messages(&owner).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
    schema: RwLock<Option<u32>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStore for MemoryStore {
    fn setup(&self) -> StoreResult<u32> {
        Ok(*self.schema.write().get_or_insert(SCHEMA_VERSION))
    }

    fn transaction<T, E, F>(&self, owner: &OwnerId, isolation: IsolationLevel, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn OwnerTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.tables.run(owner, isolation, f, |_| Ok(()))
    }

    fn messages_since(
        &self,
        owner: &OwnerId,
        since: &Timestamp,
        exclude_node: NodeId,
    ) -> StoreResult<Vec<Message>> {
        Ok(self.tables.messages_since(owner, since, exclude_node))
    }

    fn load_tree(&self, owner: &OwnerId) -> StoreResult<Option<String>> {
        Ok(self.tables.load_tree(owner))
    }

    fn owners(&self) -> StoreResult<Vec<OwnerId>> {
        Ok(self.tables.owners())
    }

    fn messages(&self, owner: &OwnerId) -> StoreResult<Vec<Message>> {
        Ok(self.tables.messages(owner))
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        Ok(self.tables.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::InsertOutcome;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::thread;

    fn owner(id: &str) -> OwnerId {
        OwnerId::new(id).unwrap()
    }

    fn ts(millis: u64, node: u64) -> Timestamp {
        Timestamp::new(millis, 0, NodeId::new(node)).unwrap()
    }

    fn insert(store: &MemoryStore, owner: &OwnerId, t: Timestamp) -> InsertOutcome {
        store
            .transaction(owner, IsolationLevel::Serializable, |txn| {
                txn.insert_message(t, Bytes::from_static(b"x"))
            })
            .unwrap()
    }

    #[test]
    fn setup_is_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(store.setup().unwrap(), SCHEMA_VERSION);
        assert_eq!(store.setup().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn duplicate_insert_is_reported_not_failed() {
        let store = MemoryStore::new();
        let u1 = owner("u1");
        assert_eq!(insert(&store, &u1, ts(1, 1)), InsertOutcome::Inserted);
        assert_eq!(insert(&store, &u1, ts(1, 1)), InsertOutcome::Duplicate);
        assert_eq!(store.messages(&u1).unwrap().len(), 1);
    }

    #[test]
    fn duplicates_within_one_transaction() {
        let store = MemoryStore::new();
        let u1 = owner("u1");
        let outcomes = store
            .transaction(&u1, IsolationLevel::Serializable, |txn| {
                let a = txn.insert_message(ts(5, 1), Bytes::from_static(b"a"))?;
                let b = txn.insert_message(ts(5, 1), Bytes::from_static(b"b"))?;
                Ok::<_, StoreError>((a, b))
            })
            .unwrap();
        assert_eq!(outcomes, (InsertOutcome::Inserted, InsertOutcome::Duplicate));
        assert_eq!(store.messages(&u1).unwrap()[0].content, Bytes::from_static(b"a"));
    }

    #[test]
    fn same_timestamp_different_owners() {
        let store = MemoryStore::new();
        assert!(insert(&store, &owner("u1"), ts(1, 1)).is_inserted());
        assert!(insert(&store, &owner("u2"), ts(1, 1)).is_inserted());
        assert_eq!(store.owners().unwrap(), vec![owner("u1"), owner("u2")]);
    }

    #[test]
    fn failed_transaction_persists_nothing() {
        let store = MemoryStore::new();
        let u1 = owner("u1");
        let result: Result<(), StoreError> =
            store.transaction(&u1, IsolationLevel::Serializable, |txn| {
                txn.insert_message(ts(1, 1), Bytes::from_static(b"x"))?;
                txn.upsert_tree("{}".into())?;
                Err(StoreError::aborted("caller gave up"))
            });
        assert!(matches!(result, Err(StoreError::Aborted(_))));
        assert!(store.messages(&u1).unwrap().is_empty());
        assert_eq!(store.load_tree(&u1).unwrap(), None);
        assert_eq!(store.stats().unwrap().commits, 0);
    }

    #[test]
    fn reads_see_pending_writes() {
        let store = MemoryStore::new();
        let u1 = owner("u1");
        store
            .transaction(&u1, IsolationLevel::Serializable, |txn| {
                assert_eq!(txn.owner(), &owner("u1"));
                assert_eq!(txn.load_tree()?, None);
                txn.upsert_tree("{\"hash\":1}".into())?;
                assert_eq!(txn.load_tree()?.as_deref(), Some("{\"hash\":1}"));
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert_eq!(store.load_tree(&u1).unwrap().as_deref(), Some("{\"hash\":1}"));
    }

    #[test]
    fn empty_transaction_is_not_a_commit() {
        let store = MemoryStore::new();
        store
            .transaction(&owner("u1"), IsolationLevel::Serializable, |txn| {
                txn.load_tree().map(|_| ())
            })
            .unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
        assert!(store.owners().unwrap().is_empty());
    }

    #[test]
    fn messages_since_filters_and_orders() {
        let store = MemoryStore::new();
        let u1 = owner("u1");
        for t in [ts(30, 2), ts(10, 1), ts(20, 2), ts(40, 1)] {
            insert(&store, &u1, t);
        }
        let since = Timestamp::lower_bound(20).unwrap();
        let got: Vec<_> = store
            .messages_since(&u1, &since, NodeId::new(1))
            .unwrap()
            .into_iter()
            .map(|m| m.timestamp)
            .collect();
        assert_eq!(got, vec![ts(20, 2), ts(30, 2)]);
        assert!(store
            .messages_since(&owner("nobody"), &since, NodeId::new(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn serializable_transactions_do_not_lose_updates() {
        let store = Arc::new(MemoryStore::new());
        let u1 = owner("u1");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let u1 = u1.clone();
                thread::spawn(move || {
                    for j in 0..25u64 {
                        store
                            .transaction(&u1, IsolationLevel::Serializable, |txn| {
                                // read-modify-write of a counter held in the tree row
                                let current: u64 = txn
                                    .load_tree()?
                                    .and_then(|t| t.parse().ok())
                                    .unwrap_or(0);
                                txn.insert_message(ts(i * 1_000 + j, i + 1), Bytes::new())?;
                                txn.upsert_tree((current + 1).to_string())?;
                                Ok::<_, StoreError>(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.load_tree(&u1).unwrap().as_deref(), Some("200"));
        assert_eq!(store.messages(&u1).unwrap().len(), 200);
        assert_eq!(store.stats().unwrap().commits, 200);
    }
}
