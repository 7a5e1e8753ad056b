//! Error types for the sync server.

use logsync_protocol::ProtocolError;
use logsync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by a sync.
///
/// Both kinds leave nothing persisted and are safe to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// The request could not be parsed or violates a limit.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Storage or the transaction failed.
    #[error("sync failed: {0}")]
    SyncFailed(String),
}

impl ServerError {
    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Creates a sync failure.
    pub fn sync_failed(message: impl Into<String>) -> Self {
        Self::SyncFailed(message.into())
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::BadRequest(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::SyncFailed(_))
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::SyncFailed(_) => 500,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::SyncFailed(err.to_string())
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::bad_request("bad").is_client_error());
        assert!(ServerError::sync_failed("oops").is_server_error());
        assert!(!ServerError::bad_request("bad").is_server_error());
        assert_eq!(ServerError::bad_request("bad").status_code(), 400);
        assert_eq!(ServerError::sync_failed("oops").status_code(), 500);
    }

    #[test]
    fn store_errors_are_sync_failures() {
        let err: ServerError = StoreError::aborted("conflict").into();
        assert!(err.is_server_error());
        assert!(err.to_string().contains("conflict"));
    }

    #[test]
    fn protocol_errors_are_client_errors() {
        let err: ServerError = logsync_protocol::Timestamp::decode("nope").unwrap_err().into();
        assert_eq!(err.status_code(), 400);
    }
}
