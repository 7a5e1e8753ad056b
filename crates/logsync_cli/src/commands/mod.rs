//! CLI command implementations.
//!
//! Commands read the journal file directly and never take the store lock,
//! so they can run next to a live server.

pub mod diff;
pub mod dump_journal;
pub mod inspect;
pub mod verify;

use logsync_protocol::{OwnerId, ProtocolError, Timestamp};
use logsync_store::journal::{replay, JournalRecord, Replay};
use logsync_store::{StoreError, JOURNAL_FILE};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// No journal at the given path.
    #[error("no journal found at {0}")]
    NotFound(PathBuf),

    /// A command needs `--path`.
    #[error("journal path required for {0}")]
    MissingPath(&'static str),

    /// Reading a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The journal could not be replayed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A digest or timestamp did not parse.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// JSON output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerifyFailed(usize),
}

/// Output format for reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Committed state for one owner, rebuilt from commit frames.
#[derive(Debug, Default)]
pub struct OwnerState {
    /// Every logged timestamp.
    pub timestamps: BTreeSet<Timestamp>,
    /// The last digest written, if any.
    pub tree: Option<String>,
}

/// A replayed journal.
#[derive(Debug)]
pub struct JournalView {
    /// Journal file size in bytes.
    pub journal_bytes: u64,
    /// Decoded frames.
    pub replay: Replay,
    /// Schema version from the schema frame.
    pub schema: Option<u32>,
    /// Per-owner state.
    pub owners: BTreeMap<OwnerId, OwnerState>,
}

impl JournalView {
    /// Reads and replays the journal under `dir`.
    ///
    /// # Errors
    ///
    /// Fails if the journal is missing, unreadable, or has a damaged frame.
    pub fn load(dir: &Path) -> CliResult<Self> {
        let file = dir.join(JOURNAL_FILE);
        if !file.exists() {
            return Err(CliError::NotFound(dir.to_path_buf()));
        }
        let data = std::fs::read(&file)?;
        let replay = replay(&data)?;
        if replay.torn_bytes > 0 {
            warn!(torn_bytes = replay.torn_bytes, "journal ends in a torn frame");
        }

        let mut schema = None;
        let mut owners: BTreeMap<OwnerId, OwnerState> = BTreeMap::new();
        for entry in &replay.entries {
            match &entry.record {
                JournalRecord::Schema(record) => schema = Some(record.version),
                JournalRecord::Commit(commit) => {
                    let state = owners.entry(commit.owner.clone()).or_default();
                    state
                        .timestamps
                        .extend(commit.messages.iter().map(|m| m.timestamp));
                    if let Some(tree) = &commit.tree {
                        state.tree = Some(tree.clone());
                    }
                }
            }
        }
        info!(frames = replay.entries.len(), owners = owners.len(), "journal replayed");

        Ok(Self {
            journal_bytes: data.len() as u64,
            replay,
            schema,
            owners,
        })
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
