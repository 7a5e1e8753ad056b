//! Sync envelopes and their binary codec.
//!
//! Envelopes travel as CBOR maps with camelCase keys:
//!
//! ```text
//! SyncRequest  { ownerId, nodeId, merkleTree, messages: [{ timestamp, content }] }
//! SyncResponse { merkleTree, messages: [{ timestamp, content }] }
//! ```
//!
//! `content` is a CBOR byte string. Timestamps, node ids and owner ids are
//! validated while decoding; the Merkle tree is carried as its persisted
//! text and parsed by whoever needs it.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{NodeId, OwnerId};
use crate::merkle::MerkleTree;
use crate::timestamp::Timestamp;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One entry of an owner's log.
///
/// Identity is `(owner, timestamp)`; the owner is implied by the envelope
/// or the store partition the message lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// When, and on which node, the message was created.
    pub timestamp: Timestamp,
    /// Opaque payload.
    pub content: Bytes,
}

impl Message {
    /// Creates a message.
    pub fn new(timestamp: Timestamp, content: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            content: content.into(),
        }
    }
}

/// Request sent by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Owner whose log is being synchronized.
    pub owner_id: OwnerId,
    /// The requesting node.
    pub node_id: NodeId,
    /// The node's digest in persisted form.
    pub merkle_tree: String,
    /// Messages the node wants to upload.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl SyncRequest {
    /// Creates a request with no messages.
    pub fn new(owner_id: OwnerId, node_id: NodeId, tree: &MerkleTree) -> Self {
        Self {
            owner_id,
            node_id,
            merkle_tree: tree.serialize(),
            messages: Vec::new(),
        }
    }

    /// Adds a message to upload.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Replaces the submitted digest text.
    #[must_use]
    pub fn with_raw_tree(mut self, merkle_tree: impl Into<String>) -> Self {
        self.merkle_tree = merkle_tree.into();
        self
    }

    /// Encodes to CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] if serialization fails.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] for malformed input, including
    /// invalid ids and timestamps.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Response returned to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// The server's digest after merging the request.
    pub merkle_tree: String,
    /// Messages the node is missing, ascending by timestamp.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl SyncResponse {
    /// Parses the server digest.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CorruptMerkleTree`] if the text is invalid.
    pub fn tree(&self) -> ProtocolResult<MerkleTree> {
        MerkleTree::deserialize(&self.merkle_tree)
    }

    /// Encodes to CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] if serialization fails.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] for malformed input.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| ProtocolError::codec(e.to_string()))?;
    Ok(out)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;

    fn sample_request() -> SyncRequest {
        let node = NodeId::new(0x8f3b_2c1d_00e4_a7b9);
        let ts = Timestamp::new(1_709_212_455_016, 42, node).unwrap();
        SyncRequest::new(OwnerId::new("u1").unwrap(), node, &MerkleTree::empty())
            .with_message(Message::new(ts, &b"hello"[..]))
    }

    fn map_keys(value: &Value) -> Vec<String> {
        value
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap().to_string())
            .collect()
    }

    #[test]
    fn request_roundtrip() {
        let request = sample_request();
        let bytes = request.encode().unwrap();
        assert_eq!(SyncRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn request_uses_wire_field_names() {
        let bytes = sample_request().encode().unwrap();
        let value: Value = ciborium::de::from_reader(&bytes[..]).unwrap();
        assert_eq!(
            map_keys(&value),
            vec!["ownerId", "nodeId", "merkleTree", "messages"]
        );

        let messages = value.as_map().unwrap()[3].1.as_array().unwrap();
        let message = &messages[0];
        assert_eq!(map_keys(message), vec!["timestamp", "content"]);
        let fields = message.as_map().unwrap();
        assert_eq!(
            fields[0].1.as_text(),
            Some("2024-02-29T13:14:15.016Z-002A-8f3b2c1d00e4a7b9")
        );
        assert_eq!(fields[1].1.as_bytes().map(Vec::as_slice), Some(&b"hello"[..]));
    }

    #[test]
    fn decode_rejects_bad_fields() {
        let encode = |value: Value| {
            let mut out = Vec::new();
            ciborium::ser::into_writer(&value, &mut out).unwrap();
            out
        };
        let request = |owner: &str, node: &str, ts: &str| {
            Value::Map(vec![
                (Value::from("ownerId"), Value::from(owner)),
                (Value::from("nodeId"), Value::from(node)),
                (Value::from("merkleTree"), Value::from("{}")),
                (
                    Value::from("messages"),
                    Value::Array(vec![Value::Map(vec![
                        (Value::from("timestamp"), Value::from(ts)),
                        (Value::from("content"), Value::Bytes(vec![1, 2, 3])),
                    ])]),
                ),
            ])
        };
        let good_ts = "2024-02-29T13:14:15.016Z-002A-8f3b2c1d00e4a7b9";
        let good_node = "8f3b2c1d00e4a7b9";

        assert!(SyncRequest::decode(&encode(request("u1", good_node, good_ts))).is_ok());
        assert!(SyncRequest::decode(&encode(request("", good_node, good_ts))).is_err());
        assert!(SyncRequest::decode(&encode(request("u1", "n1", good_ts))).is_err());
        assert!(SyncRequest::decode(&encode(request("u1", good_node, "yesterday"))).is_err());
        assert!(SyncRequest::decode(&[0xff, 0x00]).is_err());
        assert!(SyncRequest::decode(&[]).is_err());
    }

    #[test]
    fn missing_messages_default_to_empty() {
        let value = Value::Map(vec![(Value::from("merkleTree"), Value::from("{}"))]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();
        let response = SyncResponse::decode(&bytes).unwrap();
        assert!(response.messages.is_empty());
        assert!(response.tree().unwrap().is_empty());
    }

    #[test]
    fn corrupt_tree_survives_decoding() {
        let request = sample_request().with_raw_tree("not a tree");
        let decoded = SyncRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded.merkle_tree, "not a tree");
    }
}
