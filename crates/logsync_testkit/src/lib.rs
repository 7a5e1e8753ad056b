//! # logsync Testkit
//!
//! Test utilities for logsync.
//!
//! This crate provides:
//! - Fixtures: id and timestamp shorthands, a temp-dir journal store, and a
//!   store whose commits can be made to fail
//! - Property-based test generators using proptest
//! - A client [`Replica`] for multi-node convergence tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use logsync_testkit::prelude::*;
//!
//! let journal = TestJournal::new();
//! let journal = journal.reopen();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod replica;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::replica::*;
}

pub use fixtures::*;
pub use generators::*;
pub use replica::Replica;
