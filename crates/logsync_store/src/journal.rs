//! Commit journal framing and replay.
//!
//! ## Frame Layout
//!
//! ```text
//! ┌──────────┬─────────┬──────┬─────────┬──────────────┬───────┐
//! │ "LSJR"   │ version │ kind │ length  │ CBOR payload │ CRC32 │
//! │ 4 bytes  │ u16 LE  │ u8   │ u32 LE  │ length bytes │ u32 LE│
//! └──────────┴─────────┴──────┴─────────┴──────────────┴───────┘
//! ```
//!
//! The CRC covers everything before it. A frame cut short by a crash is a
//! torn tail and is dropped on replay; a complete frame whose CRC does not
//! match is corruption.

use crate::error::{StoreError, StoreResult};
use logsync_protocol::{Message, OwnerId};
use serde::{Deserialize, Serialize};

/// Magic bytes opening every frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"LSJR";

/// Current frame format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Schema marker written by setup.
    Schema = 1,
    /// One committed owner transaction.
    Commit = 2,
}

impl FrameKind {
    /// Converts a byte to a frame kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Schema),
            2 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Payload of a schema frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Schema version the store was set up with.
    pub version: u32,
}

/// Payload of a commit frame: everything one transaction wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Owner the transaction was scoped to.
    pub owner: OwnerId,
    /// Newly inserted messages, ascending by timestamp.
    pub messages: Vec<Message>,
    /// The digest row after the transaction, if it was written.
    pub tree: Option<String>,
}

/// A decoded journal frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// See [`SchemaRecord`].
    Schema(SchemaRecord),
    /// See [`CommitRecord`].
    Commit(CommitRecord),
}

impl JournalRecord {
    /// Returns the frame kind.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Schema(_) => FrameKind::Schema,
            Self::Commit(_) => FrameKind::Commit,
        }
    }

    /// Encodes the record as a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Codec`] if the payload cannot be serialized or
    /// is larger than the length field allows.
    pub fn encode_frame(&self) -> StoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        let written = match self {
            Self::Schema(record) => ciborium::ser::into_writer(record, &mut payload),
            Self::Commit(record) => ciborium::ser::into_writer(record, &mut payload),
        };
        written.map_err(|e| StoreError::codec(e.to_string()))?;

        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::codec("journal payload too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&JOURNAL_MAGIC);
        frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        frame.push(self.kind().as_byte());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    fn decode_payload(kind: FrameKind, payload: &[u8]) -> StoreResult<Self> {
        Ok(match kind {
            FrameKind::Schema => Self::Schema(decode_cbor(payload)?),
            FrameKind::Commit => Self::Commit(decode_cbor(payload)?),
        })
    }
}

fn decode_cbor<T: serde::de::DeserializeOwned>(payload: &[u8]) -> StoreResult<T> {
    ciborium::de::from_reader(payload).map_err(|e| StoreError::codec(e.to_string()))
}

/// A frame found during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Offset of the frame within the journal.
    pub offset: u64,
    /// Total frame length in bytes.
    pub len: usize,
    /// The decoded record.
    pub record: JournalRecord,
}

/// Result of scanning a journal.
#[derive(Debug, Clone, Default)]
pub struct Replay {
    /// Every complete frame, in order.
    pub entries: Vec<JournalEntry>,
    /// Length of the valid prefix; anything after it is a torn tail.
    pub valid_len: u64,
    /// Number of trailing bytes past the valid prefix.
    pub torn_bytes: u64,
}

/// Scans a journal image.
///
/// # Errors
///
/// - [`StoreError::ChecksumMismatch`] for a complete frame with a bad CRC
/// - [`StoreError::Corrupted`] for bad magic, an unknown version or kind
/// - [`StoreError::Codec`] for a payload that does not decode
pub fn replay(data: &[u8]) -> StoreResult<Replay> {
    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let offset = pos as u64;
        let rest = &data[pos..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[0..4] != JOURNAL_MAGIC {
            return Err(StoreError::corrupted(format!("invalid magic at offset {offset}")));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > JOURNAL_VERSION {
            return Err(StoreError::corrupted(format!(
                "unsupported frame version {version} at offset {offset}"
            )));
        }
        let kind_byte = rest[6];
        let kind = FrameKind::from_byte(kind_byte).ok_or_else(|| {
            StoreError::corrupted(format!("unknown frame kind {kind_byte} at offset {offset}"))
        })?;
        let payload_len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;
        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if rest.len() < total {
            break;
        }

        let payload_end = HEADER_SIZE + payload_len;
        let expected = u32::from_le_bytes([
            rest[payload_end],
            rest[payload_end + 1],
            rest[payload_end + 2],
            rest[payload_end + 3],
        ]);
        let actual = compute_crc32(&rest[..payload_end]);
        if expected != actual {
            return Err(StoreError::ChecksumMismatch {
                offset,
                expected,
                actual,
            });
        }

        let record = JournalRecord::decode_payload(kind, &rest[HEADER_SIZE..payload_end])?;
        entries.push(JournalEntry {
            offset,
            len: total,
            record,
        });
        pos += total;
    }

    Ok(Replay {
        entries,
        valid_len: pos as u64,
        torn_bytes: (data.len() - pos) as u64,
    })
}

/// CRC-32 (IEEE 802.3 polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
