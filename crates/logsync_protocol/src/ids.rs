//! Owner and node identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier of a client replica.
///
/// Rendered as exactly 16 lowercase hex characters. The all-zero id is
/// reserved for synthetic boundary timestamps and is never handed out by
/// [`NodeId::random`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Length of the textual form.
    pub const ENCODED_LEN: usize = 16;

    /// The reserved all-zero node id.
    pub const ZERO: NodeId = NodeId(0);

    /// Creates a node id from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Generates a fresh non-zero node id.
    #[must_use]
    pub fn random() -> Self {
        loop {
            let value: u64 = rand::random();
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// Parses the 16-character lowercase hex form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidNodeId`] for any other input.
    pub fn parse(input: &str) -> ProtocolResult<Self> {
        let valid = input.len() == Self::ENCODED_LEN
            && input
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(ProtocolError::InvalidNodeId(input.chars().take(32).collect()));
        }
        u64::from_str_radix(input, 16)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidNodeId(input.to_string()))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Identity under which a message log and its digest are partitioned.
///
/// Any non-empty string of at most [`OwnerId::MAX_LEN`] bytes without
/// control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Maximum length in bytes.
    pub const MAX_LEN: usize = 256;

    /// Validates and wraps an owner id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidOwnerId`] if the id is empty, longer
    /// than [`OwnerId::MAX_LEN`] bytes, or contains control characters.
    pub fn new(id: impl Into<String>) -> ProtocolResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ProtocolError::InvalidOwnerId("empty".into()));
        }
        if id.len() > Self::MAX_LEN {
            return Err(ProtocolError::InvalidOwnerId(format!(
                "{} bytes exceeds the maximum of {}",
                id.len(),
                Self::MAX_LEN
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(ProtocolError::InvalidOwnerId(
                "contains control characters".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

impl FromStr for OwnerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display_is_fixed_width() {
        assert_eq!(NodeId::new(1).to_string(), "0000000000000001");
        assert_eq!(NodeId::new(u64::MAX).to_string(), "ffffffffffffffff");
    }

    #[test]
    fn node_id_parse_roundtrip() {
        let id = NodeId::new(0x1234_abcd_0000_ffff);
        assert_eq!(NodeId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn node_id_rejects_bad_input() {
        assert!(NodeId::parse("").is_err());
        assert!(NodeId::parse("123").is_err());
        assert!(NodeId::parse("ABCDEF0123456789").is_err());
        assert!(NodeId::parse("g000000000000000").is_err());
        assert!(NodeId::parse("+000000000000000").is_err());
        assert!(NodeId::parse("00000000000000000").is_err());
    }

    #[test]
    fn random_node_id_is_not_zero() {
        for _ in 0..100 {
            assert_ne!(NodeId::random(), NodeId::ZERO);
        }
    }

    #[test]
    fn owner_id_validation() {
        assert!(OwnerId::new("u1").is_ok());
        assert!(OwnerId::new("").is_err());
        assert!(OwnerId::new("a\nb").is_err());
        assert!(OwnerId::new("x".repeat(OwnerId::MAX_LEN)).is_ok());
        assert!(OwnerId::new("x".repeat(OwnerId::MAX_LEN + 1)).is_err());
    }
}
