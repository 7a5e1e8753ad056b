//! logsync CLI
//!
//! Command-line tools for logsync journals.
//!
//! # Commands
//!
//! - `inspect` - Display owners, message counts and digests
//! - `verify` - Check frame checksums and that every digest matches its log
//! - `diff` - Find where two serialized digests diverge
//! - `dump-journal` - List journal frames for debugging

mod commands;

use clap::{Parser, Subcommand};
use commands::{CliError, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// logsync command-line journal tools.
#[derive(Parser)]
#[command(name = "logsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display owners, message counts and digests
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Verify checksums and digest consistency
    Verify,

    /// Find where two digests diverge (inline JSON or @file)
    Diff {
        /// First digest
        tree_a: String,
        /// Second digest
        tree_b: String,
    },

    /// Dump journal frames for debugging
    DumpJournal {
        /// Maximum number of frames to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or(CliError::MissingPath("inspect"))?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or(CliError::MissingPath("verify"))?;
            commands::verify::run(&path)?;
        }
        Commands::Diff { tree_a, tree_b } => {
            commands::diff::run(&tree_a, &tree_b)?;
        }
        Commands::DumpJournal { limit, format } => {
            let path = cli.path.ok_or(CliError::MissingPath("dump-journal"))?;
            commands::dump_journal::run(&path, limit, format)?;
        }
        Commands::Version => {
            println!("logsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Merkle radix {}, depth {}, journal schema v{}",
                logsync_protocol::RADIX,
                logsync_protocol::DEPTH,
                logsync_store::SCHEMA_VERSION
            );
        }
    }

    Ok(())
}
