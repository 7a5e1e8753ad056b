//! Verify command implementation.

use super::{CliError, CliResult, JournalView};
use logsync_protocol::MerkleTree;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Frames whose checksum was verified.
    pub frames_checked: usize,
    /// Owners whose digest was checked against their log.
    pub owners_checked: usize,
    /// Torn tail bytes. Recoverable, so not a problem.
    pub torn_bytes: u64,
    /// Problems found.
    pub problems: Vec<String>,
}

impl VerifyResult {
    /// True when no problems were found.
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Checks every frame checksum and every owner's digest.
///
/// # Errors
///
/// Fails if the journal is missing or a frame is damaged. Digest mismatches
/// are reported in the result.
pub fn collect(path: &Path) -> CliResult<VerifyResult> {
    let view = JournalView::load(path)?;
    let mut result = VerifyResult {
        frames_checked: view.replay.entries.len(),
        torn_bytes: view.replay.torn_bytes,
        ..VerifyResult::default()
    };

    for (owner, state) in &view.owners {
        result.owners_checked += 1;
        let rebuilt = MerkleTree::from_timestamps(state.timestamps.iter().copied());
        let stored = match state.tree.as_deref() {
            Some(text) => match MerkleTree::deserialize(text) {
                Ok(tree) => tree,
                Err(err) => {
                    result.problems.push(format!("{owner}: stored digest does not parse: {err}"));
                    continue;
                }
            },
            None => MerkleTree::empty(),
        };
        if stored != rebuilt {
            result.problems.push(format!(
                "{owner}: stored root {} does not match root {} rebuilt from {} messages",
                stored.root_hash(),
                rebuilt.root_hash(),
                state.timestamps.len()
            ));
        }
    }
    Ok(result)
}

/// Runs the verify command.
///
/// # Errors
///
/// Returns [`CliError::VerifyFailed`] if any problem is found.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying journal at {}", path.display());
    println!();
    let result = collect(path)?;

    println!("  Frames checked: {}", result.frames_checked);
    println!("  Owners checked: {}", result.owners_checked);
    if result.torn_bytes > 0 {
        println!(
            "  Torn tail:      {} bytes (truncated on next open)",
            result.torn_bytes
        );
    }
    for problem in &result.problems {
        println!("  ERROR: {problem}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err(CliError::VerifyFailed(result.problems.len()))
    }
}
