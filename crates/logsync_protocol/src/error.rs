//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building, decoding or merging protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A timestamp string could not be decoded.
    #[error("malformed timestamp {input:?}: {reason}")]
    MalformedTimestamp {
        /// The rejected input (truncated to a printable length).
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A serialized Merkle tree could not be decoded.
    #[error("corrupt merkle tree: {reason}")]
    CorruptMerkleTree {
        /// Description of the structural problem.
        reason: String,
    },

    /// A node identifier is not 16 lowercase hex characters.
    #[error("invalid node id {0:?}")]
    InvalidNodeId(String),

    /// An owner identifier is empty, too long or contains control characters.
    #[error("invalid owner id: {0}")]
    InvalidOwnerId(String),

    /// The next timestamp would run ahead of the wall clock by more than allowed.
    #[error("clock drift of {drift_ms} ms exceeds the maximum of {max_drift_ms} ms")]
    ClockDrift {
        /// Observed drift in milliseconds.
        drift_ms: u64,
        /// Configured maximum drift in milliseconds.
        max_drift_ms: u64,
    },

    /// More than 65 536 timestamps were requested within one millisecond.
    #[error("timestamp counter overflow")]
    CounterOverflow,

    /// A remote timestamp claims to come from the local node.
    #[error("remote timestamp carries the local node id {0}")]
    DuplicateNode(String),

    /// The instant cannot be represented in the digest's key space.
    #[error("time {millis} ms is outside the supported range")]
    TimeOutOfRange {
        /// The rejected instant.
        millis: u64,
    },

    /// Envelope encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ProtocolError {
    /// Creates a malformed timestamp error.
    pub fn malformed_timestamp(input: &str, reason: impl Into<String>) -> Self {
        let input: String = input.chars().take(64).collect();
        Self::MalformedTimestamp {
            input,
            reason: reason.into(),
        }
    }

    /// Creates a corrupt Merkle tree error.
    pub fn corrupt_merkle_tree(reason: impl Into<String>) -> Self {
        Self::CorruptMerkleTree {
            reason: reason.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_timestamp_truncates_input() {
        let long = "x".repeat(500);
        let err = ProtocolError::malformed_timestamp(&long, "too long");
        match err {
            ProtocolError::MalformedTimestamp { input, .. } => assert_eq!(input.len(), 64),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn error_display() {
        let err = ProtocolError::ClockDrift {
            drift_ms: 400_000,
            max_drift_ms: 300_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("400000"));
        assert!(msg.contains("300000"));
    }
}
