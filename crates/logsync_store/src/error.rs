//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a log.
    #[error("read beyond end of log: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current log size.
        size: u64,
    },

    /// The journal is structurally damaged.
    #[error("journal corrupted: {0}")]
    Corrupted(String),

    /// A complete journal frame failed its checksum.
    #[error("checksum mismatch at offset {offset}: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Offset of the damaged frame.
        offset: u64,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// Another process holds the store directory.
    #[error("store directory is locked by another process: {0}")]
    Locked(String),

    /// A journal payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The transaction was rolled back.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// The journal was written by a different schema version.
    #[error("schema version mismatch: store has {found}, expected {expected}")]
    SchemaMismatch {
        /// Version this build understands.
        expected: u32,
        /// Version recorded in the journal.
        found: u32,
    },
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Creates an aborted-transaction error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }
}
