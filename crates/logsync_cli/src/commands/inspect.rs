//! Inspect command implementation.

use super::{format_size, CliResult, JournalView, OutputFormat};
use logsync_protocol::MerkleTree;
use serde::Serialize;
use std::path::Path;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal directory.
    pub path: String,
    /// Schema version, if setup ran.
    pub schema_version: Option<u32>,
    /// Journal size in bytes.
    pub journal_bytes: u64,
    /// Number of frames.
    pub frames: usize,
    /// Bytes of torn tail that a store open would truncate.
    pub torn_bytes: u64,
    /// Per-owner summary.
    pub owners: Vec<OwnerSummary>,
}

/// Summary for one owner.
#[derive(Debug, Serialize)]
pub struct OwnerSummary {
    /// Owner id.
    pub owner: String,
    /// Messages logged.
    pub messages: usize,
    /// Root digest of the stored tree, if it parses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_hash: Option<i32>,
}

/// Builds the inspection result.
///
/// # Errors
///
/// Fails if the journal cannot be replayed.
pub fn collect(path: &Path) -> CliResult<InspectResult> {
    let view = JournalView::load(path)?;
    let owners = view
        .owners
        .iter()
        .map(|(owner, state)| OwnerSummary {
            owner: owner.to_string(),
            messages: state.timestamps.len(),
            root_hash: state
                .tree
                .as_deref()
                .and_then(|text| MerkleTree::deserialize(text).ok())
                .map(|tree| tree.root_hash()),
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        schema_version: view.schema,
        journal_bytes: view.journal_bytes,
        frames: view.replay.entries.len(),
        torn_bytes: view.replay.torn_bytes,
        owners,
    })
}

/// Runs the inspect command.
///
/// # Errors
///
/// Fails if the journal cannot be replayed or output cannot be written.
pub fn run(path: &Path, format: OutputFormat) -> CliResult<()> {
    let result = collect(path)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("logsync Journal Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    match result.schema_version {
        Some(version) => println!("Schema: v{version}"),
        None => println!("Schema: not set up"),
    }
    println!();
    println!("Journal:");
    println!("  Size:   {} bytes", format_size(result.journal_bytes));
    println!("  Frames: {}", result.frames);
    if result.torn_bytes > 0 {
        println!("  Torn:   {} bytes at tail", result.torn_bytes);
    }
    println!();
    println!("Owners: {}", result.owners.len());
    for owner in &result.owners {
        match owner.root_hash {
            Some(hash) => println!("  {} {} messages, root {hash}", owner.owner, owner.messages),
            None => println!("  {} {} messages, no digest", owner.owner, owner.messages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::populated_journal;
    use crate::commands::CliError;

    #[test]
    fn summarizes_owners() {
        let journal = populated_journal();
        let result = collect(journal.path()).unwrap();
        assert_eq!(result.schema_version, Some(logsync_store::SCHEMA_VERSION));
        assert_eq!(result.frames, 3);
        assert_eq!(result.torn_bytes, 0);
        assert_eq!(result.journal_bytes, journal.journal_size().unwrap());

        let counts: Vec<_> = result
            .owners
            .iter()
            .map(|o| (o.owner.as_str(), o.messages))
            .collect();
        assert_eq!(counts, vec![("alice", 3), ("bob", 2)]);
        assert!(result.owners.iter().all(|o| o.root_hash.is_some()));
    }

    #[test]
    fn json_output_names_fields() {
        let journal = populated_journal();
        let json = serde_json::to_value(collect(journal.path()).unwrap()).unwrap();
        assert_eq!(json["owners"][0]["owner"], "alice");
        assert_eq!(json["frames"], 3);
    }

    #[test]
    fn missing_journal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(collect(dir.path()), Err(CliError::NotFound(_))));
    }
}
