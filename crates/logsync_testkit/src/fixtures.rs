//! Test fixtures and store helpers.

use logsync_protocol::{Message, NodeId, OwnerId, Timestamp};
use logsync_store::{
    IsolationLevel, JournalStore, MemoryStore, OwnerTransaction, StoreConfig, StoreError,
    StoreResult, StoreStats, SyncStore,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Owner id from a literal.
pub fn owner(id: &str) -> OwnerId {
    OwnerId::new(id).expect("invalid owner id")
}

/// Node id from an integer.
pub fn node(id: u64) -> NodeId {
    NodeId::new(id)
}

/// Timestamp from its parts.
pub fn ts(millis: u64, counter: u16, node_id: u64) -> Timestamp {
    Timestamp::new(millis, counter, NodeId::new(node_id)).expect("timestamp out of range")
}

/// Message with the given timestamp parts and content.
pub fn msg(millis: u64, counter: u16, node_id: u64, content: &str) -> Message {
    Message::new(ts(millis, counter, node_id), content.as_bytes().to_vec())
}

/// A file-backed journal store in a temporary directory.
pub struct TestJournal {
    store: Arc<JournalStore>,
    dir: TempDir,
}

impl TestJournal {
    /// Opens a fresh journal store and runs setup.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp directory");
        let store = JournalStore::open(dir.path(), StoreConfig::default())
            .expect("failed to open journal store");
        store.setup().expect("schema setup failed");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// A shared handle to the store.
    pub fn store(&self) -> Arc<JournalStore> {
        Arc::clone(&self.store)
    }

    /// The journal directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes and reopens the store, replaying the journal.
    ///
    /// # Panics
    ///
    /// Panics if a handle from [`TestJournal::store`] is still alive, since
    /// it holds the directory lock.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(store);
        let store = JournalStore::open(dir.path(), StoreConfig::default())
            .expect("failed to reopen journal store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }
}

impl Default for TestJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestJournal {
    type Target = JournalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A memory store whose commits can be made to fail.
///
/// While failing, every transaction runs its body and then aborts, so the
/// body's writes are discarded exactly as on a real commit failure.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing: AtomicBool,
    aborted: AtomicUsize,
}

impl FailingStore {
    /// Creates a store that commits normally until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent commits fail or succeed.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of transactions aborted so far.
    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl SyncStore for FailingStore {
    fn setup(&self) -> StoreResult<u32> {
        self.inner.setup()
    }

    fn transaction<T, E, F>(&self, owner: &OwnerId, isolation: IsolationLevel, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn OwnerTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        if !self.failing.load(Ordering::SeqCst) {
            return self.inner.transaction(owner, isolation, f);
        }
        self.inner.transaction(owner, isolation, |txn| {
            f(txn)?;
            self.aborted.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::aborted("injected commit failure").into())
        })
    }

    fn messages_since(
        &self,
        owner: &OwnerId,
        since: &Timestamp,
        exclude_node: NodeId,
    ) -> StoreResult<Vec<Message>> {
        self.inner.messages_since(owner, since, exclude_node)
    }

    fn load_tree(&self, owner: &OwnerId) -> StoreResult<Option<String>> {
        self.inner.load_tree(owner)
    }

    fn owners(&self) -> StoreResult<Vec<OwnerId>> {
        self.inner.owners()
    }

    fn messages(&self, owner: &OwnerId) -> StoreResult<Vec<Message>> {
        self.inner.messages(owner)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        self.inner.stats()
    }
}
