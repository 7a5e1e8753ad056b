//! Journal recovery after crashes and corruption.

use bytes::Bytes;
use logsync_protocol::{NodeId, OwnerId, Timestamp};
use logsync_store::{
    IsolationLevel, JournalStore, StoreConfig, StoreError, SyncStore, JOURNAL_FILE,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn owner() -> OwnerId {
    OwnerId::new("u1").unwrap()
}

fn populate(path: &Path, count: u64) {
    let store = JournalStore::open(path, StoreConfig::default()).unwrap();
    store.setup().unwrap();
    for i in 0..count {
        let ts = Timestamp::new(i * 1_000, 0, NodeId::new(7)).unwrap();
        store
            .transaction(&owner(), IsolationLevel::Serializable, |txn| {
                txn.insert_message(ts, Bytes::from(vec![i as u8; 16]))?;
                txn.upsert_tree(format!("{{\"hash\":{i}}}"))
            })
            .unwrap();
    }
}

fn journal_len(path: &Path) -> u64 {
    std::fs::metadata(path.join(JOURNAL_FILE)).unwrap().len()
}

#[test]
fn torn_tail_is_truncated_on_open() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 3);
    let clean_len = journal_len(dir.path());

    // a crash in the middle of writing a frame header and part of its payload
    let mut file = OpenOptions::new()
        .append(true)
        .open(dir.path().join(JOURNAL_FILE))
        .unwrap();
    file.write_all(b"LSJR\x01\x00\x02\xff\x00\x00\x00partial").unwrap();
    drop(file);

    let store = JournalStore::open(dir.path(), StoreConfig::default()).unwrap();
    assert_eq!(store.messages(&owner()).unwrap().len(), 3);
    assert_eq!(store.journal_size().unwrap(), clean_len);
    drop(store);
    assert_eq!(journal_len(dir.path()), clean_len);
}

#[test]
fn writes_after_recovery_survive() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 1);
    {
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(JOURNAL_FILE))
            .unwrap();
        file.write_all(b"LSJ").unwrap();
    }
    {
        let store = JournalStore::open(dir.path(), StoreConfig::default()).unwrap();
        let ts = Timestamp::new(99_000, 0, NodeId::new(8)).unwrap();
        store
            .transaction(&owner(), IsolationLevel::Serializable, |txn| {
                txn.insert_message(ts, Bytes::from_static(b"after"))
                    .map(|_| ())
            })
            .unwrap();
    }
    let store = JournalStore::open(dir.path(), StoreConfig::default()).unwrap();
    assert_eq!(store.messages(&owner()).unwrap().len(), 2);
    assert!(store.read_journal().unwrap().torn_bytes == 0);
}

#[test]
fn damaged_frame_fails_open() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 2);

    let path = dir.path().join(JOURNAL_FILE);
    let mut data = std::fs::read(&path).unwrap();
    let last = data.len() - 8;
    data[last] ^= 0xff;
    std::fs::write(&path, &data).unwrap();

    let result = JournalStore::open(dir.path(), StoreConfig::default());
    assert!(matches!(result, Err(StoreError::ChecksumMismatch { .. })));
}

#[test]
fn unsynced_config_still_replays() {
    let dir = tempdir().unwrap();
    {
        let store =
            JournalStore::open(dir.path(), StoreConfig::new().with_sync_on_commit(false)).unwrap();
        store.setup().unwrap();
        let ts = Timestamp::new(5, 0, NodeId::new(1)).unwrap();
        store
            .transaction(&owner(), IsolationLevel::Serializable, |txn| {
                txn.insert_message(ts, Bytes::new()).map(|_| ())
            })
            .unwrap();
    }
    let store = JournalStore::open(dir.path(), StoreConfig::default()).unwrap();
    assert_eq!(store.stats().unwrap().messages, 1);
}
