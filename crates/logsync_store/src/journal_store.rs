//! Durable store: in-memory tables rebuilt from a commit journal.
//!
//! ## Directory Layout
//!
//! ```text
//! store/
//! ├─ LOCK          # advisory lock, one process at a time
//! └─ JOURNAL       # append-only commit frames
//! ```
//!
//! Every transaction that writes something appends exactly one commit
//! frame before its writes become visible. Opening the store replays the
//! journal from the start.

use crate::backend::{FileLog, LogBackend, MemoryLog};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::journal::{self, CommitRecord, JournalRecord, Replay, SchemaRecord};
use crate::tables::Tables;
use crate::traits::{IsolationLevel, OwnerTransaction, StoreStats, SyncStore, SCHEMA_VERSION};
use fs2::FileExt;
use logsync_protocol::{Message, NodeId, OwnerId, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Lock file name.
pub const LOCK_FILE: &str = "LOCK";

/// Journal file name.
pub const JOURNAL_FILE: &str = "JOURNAL";

/// A store made durable by an append-only commit journal.
pub struct JournalStore {
    tables: Tables,
    journal: Mutex<Box<dyn LogBackend>>,
    schema: RwLock<Option<u32>>,
    config: StoreConfig,
    path: Option<PathBuf>,
    /// Held for exclusive access; released on drop.
    _lock_file: Option<File>,
}

impl JournalStore {
    /// Opens the store in `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the directory does not exist and `create_if_missing` is false
    /// - another process holds the directory ([`StoreError::Locked`])
    /// - a complete journal frame is damaged
    pub fn open(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", path.display()),
                )));
            }
        }
        if !path.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path.display().to_string()));
        }

        let log = FileLog::open(&path.join(JOURNAL_FILE))?;
        let mut store = Self::with_backend(Box::new(log), config)?;
        store.path = Some(path.to_path_buf());
        store._lock_file = Some(lock_file);
        info!(path = %path.display(), "journal store opened");
        Ok(store)
    }

    /// Builds a store over an arbitrary log, replaying what it holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read or a complete frame is
    /// damaged. A torn final frame is truncated instead.
    pub fn with_backend(mut backend: Box<dyn LogBackend>, config: StoreConfig) -> StoreResult<Self> {
        let data = backend.read_all()?;
        let replay = journal::replay(&data)?;
        if replay.torn_bytes > 0 {
            warn!(
                valid_len = replay.valid_len,
                torn_bytes = replay.torn_bytes,
                "truncating torn journal tail"
            );
            backend.truncate(replay.valid_len)?;
            backend.sync()?;
        }

        let tables = Tables::default();
        let mut schema = None;
        let mut commits = 0usize;
        for entry in replay.entries {
            match entry.record {
                JournalRecord::Schema(record) => schema = Some(record.version),
                JournalRecord::Commit(record) => {
                    tables.apply(record);
                    commits += 1;
                }
            }
        }
        info!(commits, journal_bytes = replay.valid_len, "journal replayed");

        Ok(Self {
            tables,
            journal: Mutex::new(backend),
            schema: RwLock::new(schema),
            config,
            path: None,
            _lock_file: None,
        })
    }

    /// Creates a store over an empty in-memory journal.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other constructors.
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_backend(Box::new(MemoryLog::new()), StoreConfig::default())
    }

    /// The store directory, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The schema version recorded in the journal, if set up.
    #[must_use]
    pub fn schema_version(&self) -> Option<u32> {
        *self.schema.read()
    }

    /// Current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    pub fn journal_size(&self) -> StoreResult<u64> {
        self.journal.lock().size()
    }

    /// Re-reads and verifies the whole journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read or is damaged.
    pub fn read_journal(&self) -> StoreResult<Replay> {
        let data = self.journal.lock().read_all()?;
        journal::replay(&data)
    }

    fn append(&self, record: &JournalRecord) -> StoreResult<()> {
        let frame = record.encode_frame()?;
        let mut log = self.journal.lock();
        let before = log.size()?;
        let written = log.append(&frame).and_then(|_| {
            if self.config.sync_on_commit {
                log.sync()
            } else {
                Ok(())
            }
        });
        if let Err(err) = written {
            if let Err(rollback) = log.truncate(before) {
                warn!(error = %rollback, "failed to roll back partial journal frame");
            }
            return Err(err);
        }
        Ok(())
    }

    fn persist_commit(&self, record: &CommitRecord) -> StoreResult<()> {
        self.append(&JournalRecord::Commit(record.clone()))
    }
}

impl SyncStore for JournalStore {
    fn setup(&self) -> StoreResult<u32> {
        let mut schema = self.schema.write();
        match *schema {
            Some(version) if version == SCHEMA_VERSION => Ok(version),
            Some(found) => Err(StoreError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found,
            }),
            None => {
                self.append(&JournalRecord::Schema(SchemaRecord {
                    version: SCHEMA_VERSION,
                }))?;
                *schema = Some(SCHEMA_VERSION);
                info!(version = SCHEMA_VERSION, "schema created");
                Ok(SCHEMA_VERSION)
            }
        }
    }

    fn transaction<T, E, F>(&self, owner: &OwnerId, isolation: IsolationLevel, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn OwnerTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.tables
            .run(owner, isolation, f, |record| self.persist_commit(record))
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
        let mut stats = self.tables.stats();
        stats.journal_bytes = self.journal_size()?;
        Ok(stats)
    }
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("path", &self.path)
            .field("schema", &self.schema_version())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    fn owner() -> OwnerId {
        OwnerId::new("u1").unwrap()
    }

    fn write(store: &JournalStore, millis: u64) {
        let ts = Timestamp::new(millis, 0, NodeId::new(1)).unwrap();
        store
            .transaction(&owner(), IsolationLevel::Serializable, |txn| {
                txn.insert_message(ts, Bytes::from(format!("m{millis}")))?;
                txn.upsert_tree(format!("tree-{millis}"))
            })
            .unwrap();
    }

    #[test]
    fn setup_writes_one_schema_frame() {
        let store = JournalStore::in_memory().unwrap();
        assert_eq!(store.schema_version(), None);
        store.setup().unwrap();
        let size = store.journal_size().unwrap();
        store.setup().unwrap();
        assert_eq!(store.journal_size().unwrap(), size);
        assert_eq!(store.schema_version(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn commits_append_frames() {
        let store = JournalStore::in_memory().unwrap();
        store.setup().unwrap();
        write(&store, 1);
        write(&store, 2);
        let replay = store.read_journal().unwrap();
        assert_eq!(replay.entries.len(), 3);
        assert_eq!(store.stats().unwrap().commits, 2);
    }

    #[test]
    fn reopen_restores_tables() {
        let dir = tempdir().unwrap();
        {
            let store = JournalStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.setup().unwrap();
            write(&store, 1);
            write(&store, 2);
        }
        let store = JournalStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.schema_version(), Some(SCHEMA_VERSION));
        assert_eq!(store.messages(&owner()).unwrap().len(), 2);
        assert_eq!(store.load_tree(&owner()).unwrap().as_deref(), Some("tree-2"));
        assert_eq!(store.path(), Some(dir.path()));
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = JournalStore::open(dir.path(), StoreConfig::default()).unwrap();
        let second = JournalStore::open(dir.path(), StoreConfig::default());
        assert!(matches!(second, Err(StoreError::Locked(_))));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(JournalStore::open(dir.path(), StoreConfig::default()).unwrap());
        assert!(JournalStore::open(dir.path(), StoreConfig::default()).is_ok());
    }

    #[test]
    fn missing_directory_without_create() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new().with_create_if_missing(false);
        let result = JournalStore::open(&dir.path().join("absent"), config);
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let mut log = MemoryLog::new();
        let frame = JournalRecord::Schema(SchemaRecord { version: 99 })
            .encode_frame()
            .unwrap();
        log.append(&frame).unwrap();
        let store = JournalStore::with_backend(Box::new(log), StoreConfig::default()).unwrap();
        assert!(matches!(
            store.setup(),
            Err(StoreError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: 99
            })
        ));
    }
}
