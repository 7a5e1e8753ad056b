//! In-memory tables and the transaction engine shared by both stores.

use crate::error::{StoreError, StoreResult};
use crate::journal::CommitRecord;
use crate::traits::{InsertOutcome, IsolationLevel, OwnerTransaction, StoreStats};
use bytes::Bytes;
use logsync_protocol::{Message, NodeId, OwnerId, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
struct OwnerRows {
    messages: BTreeMap<Timestamp, Bytes>,
    tree: Option<String>,
}

/// Both relations for every owner, plus per-owner transaction locks.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    rows: RwLock<BTreeMap<OwnerId, OwnerRows>>,
    owner_locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
    commits: AtomicU64,
}

impl Tables {
    fn owner_lock(&self, owner: &OwnerId) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock();
        Arc::clone(locks.entry(owner.clone()).or_default())
    }

    /// Runs `f` under the owner's lock and, on success, hands the pending
    /// writes to `persist` before making them visible.
    ///
    /// `persist` runs without the table lock, so a slow journal write only
    /// holds up transactions for the same owner.
    pub(crate) fn run<T, E, F, P>(
        &self,
        owner: &OwnerId,
        isolation: IsolationLevel,
        f: F,
        persist: P,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut dyn OwnerTransaction) -> Result<T, E>,
        P: FnOnce(&CommitRecord) -> StoreResult<()>,
        E: From<StoreError>,
    {
        let owner_lock = self.owner_lock(owner);
        let _guard = match isolation {
            IsolationLevel::Serializable => owner_lock.lock(),
        };

        let mut txn = PendingTransaction {
            owner,
            tables: self,
            inserted: BTreeMap::new(),
            tree: None,
        };
        let value = f(&mut txn as &mut dyn OwnerTransaction)?;
        let record = txn.into_record();
        if record.messages.is_empty() && record.tree.is_none() {
            return Ok(value);
        }

        // only this owner's transactions touch its rows, and they wait on the guard
        persist(&record)?;
        Self::apply_locked(&mut self.rows.write(), record);
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Applies a committed record, as during journal replay.
    pub(crate) fn apply(&self, record: CommitRecord) {
        let mut rows = self.rows.write();
        Self::apply_locked(&mut rows, record);
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    fn apply_locked(rows: &mut BTreeMap<OwnerId, OwnerRows>, record: CommitRecord) {
        let entry = rows.entry(record.owner).or_default();
        for message in record.messages {
            entry
                .messages
                .entry(message.timestamp)
                .or_insert(message.content);
        }
        if let Some(tree) = record.tree {
            entry.tree = Some(tree);
        }
    }

    pub(crate) fn load_tree(&self, owner: &OwnerId) -> Option<String> {
        self.rows.read().get(owner).and_then(|r| r.tree.clone())
    }

    fn committed_contains(&self, owner: &OwnerId, timestamp: &Timestamp) -> bool {
        self.rows
            .read()
            .get(owner)
            .is_some_and(|r| r.messages.contains_key(timestamp))
    }

    pub(crate) fn messages_since(
        &self,
        owner: &OwnerId,
        since: &Timestamp,
        exclude_node: NodeId,
    ) -> Vec<Message> {
        let rows = self.rows.read();
        let Some(owner_rows) = rows.get(owner) else {
            return Vec::new();
        };
        owner_rows
            .messages
            .range(since..)
            .filter(|(ts, _)| ts.node() != exclude_node)
            .map(|(ts, content)| Message::new(*ts, content.clone()))
            .collect()
    }

    pub(crate) fn messages(&self, owner: &OwnerId) -> Vec<Message> {
        self.rows
            .read()
            .get(owner)
            .map(|r| {
                r.messages
                    .iter()
                    .map(|(ts, content)| Message::new(*ts, content.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn owners(&self) -> Vec<OwnerId> {
        self.rows.read().keys().cloned().collect()
    }

    pub(crate) fn stats(&self) -> StoreStats {
        let rows = self.rows.read();
        StoreStats {
            owners: rows.len(),
            messages: rows.values().map(|r| r.messages.len()).sum(),
            trees: rows.values().filter(|r| r.tree.is_some()).count(),
            commits: self.commits.load(Ordering::Relaxed),
            journal_bytes: 0,
        }
    }
}

struct PendingTransaction<'a> {
    owner: &'a OwnerId,
    tables: &'a Tables,
    inserted: BTreeMap<Timestamp, Bytes>,
    tree: Option<String>,
}

impl PendingTransaction<'_> {
    fn into_record(self) -> CommitRecord {
        CommitRecord {
            owner: self.owner.clone(),
            messages: self
                .inserted
                .into_iter()
                .map(|(ts, content)| Message::new(ts, content))
                .collect(),
            tree: self.tree,
        }
    }
}

impl OwnerTransaction for PendingTransaction<'_> {
    fn owner(&self) -> &OwnerId {
        self.owner
    }

    fn load_tree(&self) -> StoreResult<Option<String>> {
        match &self.tree {
            Some(tree) => Ok(Some(tree.clone())),
            None => Ok(self.tables.load_tree(self.owner)),
        }
    }

    fn insert_message(
        &mut self,
        timestamp: Timestamp,
        content: Bytes,
    ) -> StoreResult<InsertOutcome> {
        if self.inserted.contains_key(&timestamp)
            || self.tables.committed_contains(self.owner, &timestamp)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        self.inserted.insert(timestamp, content);
        Ok(InsertOutcome::Inserted)
    }

    fn upsert_tree(&mut self, serialized: String) -> StoreResult<()> {
        self.tree = Some(serialized);
        Ok(())
    }
}
