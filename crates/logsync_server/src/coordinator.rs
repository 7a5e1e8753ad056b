//! The sync coordinator: one request in, one response out.
//!
//! ## Algorithm
//!
//! 1. Validate the request. Failures are `BadRequest` and touch nothing.
//! 2. In one owner-scoped transaction: load the stored digest, insert each
//!    uploaded message, fold only newly inserted timestamps into the digest,
//!    and upsert the digest row if anything was inserted.
//! 3. Diff the committed digest against the node's digest.
//! 4. Return every message at or after the divergence point that the node
//!    did not author, ascending.
//!
//! The coordinator keeps no state between requests.

use crate::config::{CorruptClientTreePolicy, ServerConfig};
use crate::error::{ServerError, ServerResult};
use logsync_protocol::{MerkleTree, NodeId, SyncRequest, SyncResponse, Timestamp};
use logsync_store::{InsertOutcome, IsolationLevel, SyncStore};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Counters describing one completed sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// The response sent to the node.
    pub response: SyncResponse,
    /// Uploaded messages that were new.
    pub inserted: usize,
    /// Uploaded messages the server already had.
    pub duplicates: usize,
    /// Where the node's digest diverged from the server's, if it did.
    pub divergence: Option<Timestamp>,
    /// Messages included in the response.
    pub sent: usize,
}

/// Merges uploads and computes the delta for a node.
pub struct SyncCoordinator<S> {
    store: Arc<S>,
    config: ServerConfig,
}

impl<S: SyncStore> SyncCoordinator<S> {
    /// Creates a coordinator over `store`.
    pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runs a sync from an encoded request and encodes the response.
    ///
    /// # Errors
    ///
    /// - [`ServerError::BadRequest`] if the body is too large, does not
    ///   decode, or fails validation
    /// - [`ServerError::SyncFailed`] if storage fails
    pub fn sync_bytes(&self, body: &[u8]) -> ServerResult<Vec<u8>> {
        if body.len() > self.config.max_request_bytes {
            return Err(ServerError::bad_request(format!(
                "request of {} bytes exceeds the maximum of {}",
                body.len(),
                self.config.max_request_bytes
            )));
        }
        let request = SyncRequest::decode(body)
            .map_err(|e| ServerError::bad_request(format!("malformed request: {e}")))?;
        let response = self.sync(request)?;
        response
            .encode()
            .map_err(|e| ServerError::sync_failed(format!("response encoding failed: {e}")))
    }

    /// Runs a sync and returns the response.
    ///
    /// # Errors
    ///
    /// See [`SyncCoordinator::sync_with_report`].
    pub fn sync(&self, request: SyncRequest) -> ServerResult<SyncResponse> {
        self.sync_with_report(request).map(|outcome| outcome.response)
    }

    /// Runs a sync and reports what it did.
    ///
    /// # Errors
    ///
    /// - [`ServerError::BadRequest`] if the request fails validation
    /// - [`ServerError::SyncFailed`] if storage fails or the stored digest
    ///   is corrupt; nothing is persisted
    #[instrument(skip_all, fields(owner = %request.owner_id, node = %request.node_id))]
    pub fn sync_with_report(&self, request: SyncRequest) -> ServerResult<SyncOutcome> {
        self.validate(&request)?;
        let owner = &request.owner_id;

        let (tree, inserted, duplicates) =
            self.store
                .transaction(owner, IsolationLevel::Serializable, |txn| {
                    let mut tree = match txn.load_tree()? {
                        Some(text) => MerkleTree::deserialize(&text).map_err(|e| {
                            ServerError::sync_failed(format!("stored digest is corrupt: {e}"))
                        })?,
                        None => MerkleTree::empty(),
                    };

                    let mut inserted = 0usize;
                    let mut duplicates = 0usize;
                    for message in &request.messages {
                        match txn.insert_message(message.timestamp, message.content.clone())? {
                            InsertOutcome::Inserted => {
                                tree.insert_in_place(&message.timestamp);
                                inserted += 1;
                            }
                            InsertOutcome::Duplicate => duplicates += 1,
                        }
                    }

                    if inserted > 0 {
                        txn.upsert_tree(tree.serialize())?;
                    }
                    Ok::<_, ServerError>((tree, inserted, duplicates))
                })?;

        let divergence = self.divergence(&tree, &request.merkle_tree);
        let messages = match &divergence {
            Some(since) => self.store.messages_since(owner, since, request.node_id)?,
            None => Vec::new(),
        };
        let sent = messages.len();

        debug!(
            uploaded = request.messages.len(),
            inserted,
            duplicates,
            divergence = ?divergence,
            sent,
            "sync complete"
        );

        Ok(SyncOutcome {
            response: SyncResponse {
                merkle_tree: tree.serialize(),
                messages,
            },
            inserted,
            duplicates,
            divergence,
            sent,
        })
    }

    fn validate(&self, request: &SyncRequest) -> ServerResult<()> {
        if request.node_id == NodeId::ZERO {
            return Err(ServerError::bad_request("node id is reserved"));
        }
        if request.messages.len() > self.config.max_messages_per_request {
            return Err(ServerError::bad_request(format!(
                "{} messages exceeds the maximum of {}",
                request.messages.len(),
                self.config.max_messages_per_request
            )));
        }
        if let Some(message) = request
            .messages
            .iter()
            .find(|m| m.timestamp.node() == NodeId::ZERO)
        {
            return Err(ServerError::bad_request(format!(
                "message {} carries the reserved node id",
                message.timestamp
            )));
        }
        Ok(())
    }

    fn divergence(&self, server: &MerkleTree, client_text: &str) -> Option<Timestamp> {
        match MerkleTree::deserialize(client_text) {
            Ok(client) => server.diff(&client),
            Err(err) => match self.config.corrupt_client_tree {
                CorruptClientTreePolicy::EmptyDelta => {
                    warn!(error = %err, "client digest is corrupt, sending empty delta");
                    None
                }
                CorruptClientTreePolicy::FullResync => {
                    warn!(error = %err, "client digest is corrupt, sending full history");
                    (!server.is_empty()).then_some(Timestamp::MIN)
                }
            },
        }
    }
}

impl<S> std::fmt::Debug for SyncCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
