//! Diff command implementation.

use super::CliResult;
use logsync_protocol::{MerkleTree, Timestamp};

/// Reads a digest argument: inline JSON, or `@path` to read a file.
fn load_tree(arg: &str) -> CliResult<MerkleTree> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => arg.to_string(),
    };
    Ok(MerkleTree::deserialize(text.trim())?)
}

/// Finds where two digests diverge.
///
/// # Errors
///
/// Fails if either digest cannot be read or parsed.
pub fn collect(tree_a: &str, tree_b: &str) -> CliResult<Option<Timestamp>> {
    Ok(load_tree(tree_a)?.diff(&load_tree(tree_b)?))
}

/// Runs the diff command.
///
/// # Errors
///
/// Fails if either digest cannot be read or parsed.
pub fn run(tree_a: &str, tree_b: &str) -> CliResult<()> {
    match collect(tree_a, tree_b)? {
        Some(point) => println!("{point}"),
        None => println!("identical"),
    }
    Ok(())
}
