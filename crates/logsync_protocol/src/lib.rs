//! # logsync Protocol
//!
//! Timestamps, Merkle digests and sync envelopes for logsync.
//!
//! This crate provides:
//! - `Timestamp`, a sortable hybrid logical timestamp, and the clock that
//!   produces them
//! - `MerkleTree`, an incremental digest over an owner's timestamps with
//!   divergence diffing
//! - `SyncRequest` / `SyncResponse` envelopes and their CBOR codec
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! # Example
//!
//! ```rust
//! use logsync_protocol::{MerkleTree, NodeId, Timestamp};
//!
//! let node = NodeId::new(0x8f3b_2c1d_00e4_a7b9);
//! let ts = Timestamp::new(1_709_212_455_016, 42, node).unwrap();
//! assert_eq!(ts.encode(), "2024-02-29T13:14:15.016Z-002A-8f3b2c1d00e4a7b9");
//!
//! let server = MerkleTree::empty().insert(&ts);
//! let client = MerkleTree::empty();
//! let since = server.diff(&client).unwrap();
//! assert!(since <= ts);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod clock;
mod error;
mod hash;
mod ids;
mod merkle;
mod messages;
mod timestamp;

pub use clock::{Clock, ClockConfig, ManualClock, SystemClock, TimestampGenerator};
pub use error::{ProtocolError, ProtocolResult};
pub use hash::murmur3_x86_32;
pub use ids::{NodeId, OwnerId};
pub use merkle::{MerkleTree, DEPTH, RADIX};
pub use messages::{Message, SyncRequest, SyncResponse};
pub use timestamp::Timestamp;
