//! Request dispatch for the `/sync` endpoint.

use crate::config::ServerConfig;
use crate::coordinator::SyncCoordinator;
use crate::error::ServerError;
use logsync_store::SyncStore;
use std::sync::Arc;
use tracing::{error, warn};

/// The single route served.
pub const SYNC_PATH: &str = "/sync";

/// Content type of encoded sync responses.
pub const CBOR_CONTENT_TYPE: &str = "application/cbor";

/// Content type of error bodies.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// A transport-neutral response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Value for the `Content-Type` header.
    pub content_type: &'static str,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: CBOR_CONTENT_TYPE,
            body,
        }
    }

    fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_CONTENT_TYPE,
            body: message.into().into_bytes(),
        }
    }

    fn from_error(err: &ServerError) -> Self {
        Self::text(err.status_code(), err.to_string())
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The sync server.
///
/// Maps method and path to the coordinator and errors to status codes.
/// Listener wiring belongs to the embedding application.
///
/// # Example
///
/// ```
/// use logsync_server::{ServerConfig, SyncServer};
/// use logsync_store::MemoryStore;
/// use std::sync::Arc;
///
/// let server = SyncServer::new(Arc::new(MemoryStore::new()), ServerConfig::default());
/// let response = server.handle("GET", "/sync", &[]);
/// assert_eq!(response.status, 405);
/// ```
pub struct SyncServer<S> {
    coordinator: SyncCoordinator<S>,
}

impl<S: SyncStore> SyncServer<S> {
    /// Creates a server over `store`.
    pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
        Self {
            coordinator: SyncCoordinator::new(store, config),
        }
    }

    /// The coordinator requests are dispatched to.
    pub fn coordinator(&self) -> &SyncCoordinator<S> {
        &self.coordinator
    }

    /// Handles one request.
    ///
    /// `POST` and `OPTIONS` on [`SYNC_PATH`] run a sync.
    pub fn handle(&self, method: &str, path: &str, body: &[u8]) -> HttpResponse {
        if path != SYNC_PATH {
            return HttpResponse::text(404, format!("no route for {path}"));
        }
        match method {
            "POST" | "OPTIONS" => match self.coordinator.sync_bytes(body) {
                Ok(encoded) => HttpResponse::ok(encoded),
                Err(err) => {
                    if err.is_server_error() {
                        error!(error = %err, "sync failed");
                    } else {
                        warn!(error = %err, "rejected sync request");
                    }
                    HttpResponse::from_error(&err)
                }
            },
            other => HttpResponse::text(405, format!("method {other} not allowed")),
        }
    }
}

impl<S> std::fmt::Debug for SyncServer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Runs [`SyncServer::handle`] on tokio's blocking pool.
///
/// Store I/O is synchronous, so async transports hand requests over here.
pub struct AsyncSyncServer<S> {
    inner: Arc<SyncServer<S>>,
}

impl<S> Clone for AsyncSyncServer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SyncStore + Send + Sync + 'static> AsyncSyncServer<S> {
    /// Wraps a shared server.
    pub fn new(inner: Arc<SyncServer<S>>) -> Self {
        Self { inner }
    }

    /// The wrapped server.
    pub fn inner(&self) -> &Arc<SyncServer<S>> {
        &self.inner
    }

    /// Handles one request without blocking the runtime.
    pub async fn handle(&self, method: String, path: String, body: Vec<u8>) -> HttpResponse {
        let server = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || server.handle(&method, &path, &body));
        match task.await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "sync task did not complete");
                HttpResponse::from_error(&ServerError::sync_failed(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsync_protocol::{MerkleTree, NodeId, OwnerId, SyncRequest, SyncResponse};
    use logsync_store::MemoryStore;

    fn server() -> SyncServer<MemoryStore> {
        SyncServer::new(Arc::new(MemoryStore::new()), ServerConfig::default())
    }

    fn body() -> Vec<u8> {
        SyncRequest::new(OwnerId::new("u1").unwrap(), NodeId::new(1), &MerkleTree::empty())
            .encode()
            .unwrap()
    }

    #[test]
    fn post_and_options_run_sync() {
        let server = server();
        for method in ["POST", "OPTIONS"] {
            let response = server.handle(method, SYNC_PATH, &body());
            assert_eq!(response.status, 200);
            assert_eq!(response.content_type, CBOR_CONTENT_TYPE);
            let decoded = SyncResponse::decode(&response.body).unwrap();
            assert!(decoded.messages.is_empty());
            assert_eq!(decoded.merkle_tree, "{}");
        }
    }

    #[test]
    fn unknown_path() {
        assert_eq!(server().handle("POST", "/other", &body()).status, 404);
    }

    #[test]
    fn wrong_method() {
        let response = server().handle("GET", SYNC_PATH, &body());
        assert_eq!(response.status, 405);
        assert!(!response.is_success());
    }

    #[test]
    fn malformed_body_is_400() {
        let response = server().handle("POST", SYNC_PATH, b"junk");
        assert_eq!(response.status, 400);
        assert_eq!(response.content_type, TEXT_CONTENT_TYPE);
        assert!(String::from_utf8(response.body).unwrap().starts_with("bad request"));
    }

    #[tokio::test]
    async fn async_wrapper_dispatches() {
        let server = AsyncSyncServer::new(Arc::new(server()));
        let response = server
            .clone()
            .handle("POST".into(), SYNC_PATH.into(), body())
            .await;
        assert!(response.is_success());
    }
}
