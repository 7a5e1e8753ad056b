//! # logsync Server
//!
//! Merkle anti-entropy sync for per-owner message logs.
//!
//! A node uploads the messages it has produced together with its digest of
//! the owner's log. The server merges the upload into the owner's log, folds
//! the new timestamps into the stored digest, and answers with the merged
//! digest plus every message from the first point where the two digests
//! diverge. Repeating the exchange converges both sides.
//!
//! This crate provides:
//! - [`SyncCoordinator`]: the merge-and-diff algorithm over any [`SyncStore`]
//! - [`SyncServer`]: `/sync` dispatch with status code mapping
//! - [`AsyncSyncServer`]: offload to tokio's blocking pool
//!
//! # Errors
//!
//! Every failure is either [`ServerError::BadRequest`] (the caller's fault,
//! nothing touched) or [`ServerError::SyncFailed`] (storage, nothing
//! persisted). Both are safe to retry.
//!
//! [`SyncStore`]: logsync_store::SyncStore

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod coordinator;
mod error;
mod server;

pub use config::{CorruptClientTreePolicy, ServerConfig};
pub use coordinator::{SyncCoordinator, SyncOutcome};
pub use error::{ServerError, ServerResult};
pub use server::{
    AsyncSyncServer, HttpResponse, SyncServer, CBOR_CONTENT_TYPE, SYNC_PATH, TEXT_CONTENT_TYPE,
};
