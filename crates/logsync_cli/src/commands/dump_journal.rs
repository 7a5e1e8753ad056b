//! Dump-journal command implementation.

use super::{CliResult, JournalView, OutputFormat};
use logsync_store::journal::JournalRecord;
use serde::Serialize;
use std::path::Path;

/// One journal frame, summarized.
#[derive(Debug, Serialize)]
pub struct FrameSummary {
    /// Byte offset of the frame.
    pub offset: u64,
    /// Frame length including header and checksum.
    pub len: usize,
    /// `schema` or `commit`.
    pub kind: &'static str,
    /// Schema version, for schema frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Owner, for commit frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Messages in a commit frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<usize>,
    /// First and last message timestamps in a commit frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<(String, String)>,
    /// Whether a commit frame replaced the digest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree_written: Option<bool>,
}

/// Summarizes frames, starting with the first and keeping at most `limit`.
///
/// # Errors
///
/// Fails if the journal cannot be replayed.
pub fn collect(path: &Path, limit: Option<usize>) -> CliResult<Vec<FrameSummary>> {
    let view = JournalView::load(path)?;
    let frames = view
        .replay
        .entries
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|entry| match &entry.record {
            JournalRecord::Schema(schema) => FrameSummary {
                offset: entry.offset,
                len: entry.len,
                kind: "schema",
                version: Some(schema.version),
                owner: None,
                messages: None,
                span: None,
                tree_written: None,
            },
            JournalRecord::Commit(commit) => FrameSummary {
                offset: entry.offset,
                len: entry.len,
                kind: "commit",
                version: None,
                owner: Some(commit.owner.to_string()),
                messages: Some(commit.messages.len()),
                span: commit.messages.first().zip(commit.messages.last()).map(
                    |(first, last)| (first.timestamp.encode(), last.timestamp.encode()),
                ),
                tree_written: Some(commit.tree.is_some()),
            },
        })
        .collect();
    Ok(frames)
}

/// Runs the dump-journal command.
///
/// # Errors
///
/// Fails if the journal cannot be replayed or output cannot be written.
pub fn run(path: &Path, limit: Option<usize>, format: OutputFormat) -> CliResult<()> {
    let frames = collect(path, limit)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&frames)?),
        OutputFormat::Text => {
            for frame in &frames {
                print!("@{:<8} {:>6}B {:<6}", frame.offset, frame.len, frame.kind);
                if let Some(version) = frame.version {
                    print!(" v{version}");
                }
                if let (Some(owner), Some(count)) = (&frame.owner, frame.messages) {
                    print!(" owner={owner} messages={count}");
                }
                if let Some((first, last)) = &frame.span {
                    print!(" [{first} .. {last}]");
                }
                if frame.tree_written == Some(true) {
                    print!(" +tree");
                }
                println!();
            }
            println!("{} frame(s)", frames.len());
        }
    }
    Ok(())
}
