//! Merkle digest over an owner's set of timestamps.
//!
//! The tree is a ternary trie keyed by a timestamp's minute index written
//! as [`DEPTH`] base-3 digits, most significant first. Every node holds the
//! XOR of the MurmurHash3 digests of all timestamps below it, so the digest
//! depends only on set membership and not on insertion order. Each leaf also
//! keeps the sorted set of timestamps in its minute, which makes inserting a
//! present timestamp a no-op.
//!
//! ## Persisted Form
//!
//! ```text
//! {"0":{"2":{...{"hash":-1416139081,"timestamps":["2023-..."]}...},"hash":-1416139081},"hash":-1416139081}
//! ```
//!
//! Present children are keyed by their digit, followed by the node's
//! digest as a signed 32-bit integer. Leaves list their timestamps in
//! ascending order. The empty tree is `{}`.

use crate::error::{ProtocolError, ProtocolResult};
use crate::hash::murmur3_x86_32;
use crate::timestamp::Timestamp;
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, Visitor};
use std::fmt;
use std::sync::Arc;

/// Branching factor of the trie.
pub const RADIX: usize = 3;

/// Number of key digits, and so the depth of every leaf.
pub const DEPTH: usize = 16;

const HASH_KEY: &str = "hash";
const MEMBERS_KEY: &str = "timestamps";
const DIGITS: [&str; RADIX] = ["0", "1", "2"];

type Key = [u8; DEPTH];

#[derive(Debug, Clone, Default)]
struct Node {
    hash: u32,
    children: [Option<usize>; RADIX],
    /// Sorted timestamps of a leaf. `None` above the leaves, and on leaves
    /// parsed from text that carried only a digest.
    members: Option<Vec<Timestamp>>,
}

/// An immutable digest over a set of timestamps.
///
/// Nodes live in a shared index-addressed arena. Cloning is cheap and
/// [`MerkleTree::insert`] copies the arena only when it is shared and the
/// timestamp is new. Equality compares digests and shape.
#[derive(Clone)]
pub struct MerkleTree {
    nodes: Arc<Vec<Node>>,
}

impl MerkleTree {
    /// The initial tree, with digest zero.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nodes: Arc::new(vec![Node::default()]),
        }
    }

    /// Builds a tree from a set of timestamps. Duplicates are ignored.
    pub fn from_timestamps<I>(timestamps: I) -> Self
    where
        I: IntoIterator<Item = Timestamp>,
    {
        let mut tree = Self::empty();
        for ts in timestamps {
            tree.insert_in_place(&ts);
        }
        tree
    }

    /// Returns a tree that also covers `timestamp`.
    ///
    /// Inserting a timestamp the tree already holds returns an equal tree
    /// sharing the same arena.
    #[must_use]
    pub fn insert(&self, timestamp: &Timestamp) -> Self {
        let mut next = self.clone();
        next.insert_in_place(timestamp);
        next
    }

    /// Folds `timestamp` into this tree. Returns `false`, leaving the tree
    /// untouched, if it was already present.
    ///
    /// A leaf parsed from text without its timestamp list only knows its
    /// digest, so a repeat landing there cannot be detected.
    pub fn insert_in_place(&mut self, timestamp: &Timestamp) -> bool {
        if self.contains(timestamp) {
            return false;
        }
        let digest = leaf_digest(timestamp);
        let nodes = Arc::make_mut(&mut self.nodes);

        let mut index = 0;
        nodes[index].hash ^= digest;
        for digit in key_of(timestamp) {
            let slot = usize::from(digit);
            index = match nodes[index].children[slot] {
                Some(child) => child,
                None => {
                    let child = nodes.len();
                    nodes.push(Node::default());
                    nodes[index].children[slot] = Some(child);
                    child
                }
            };
            nodes[index].hash ^= digest;
        }

        let leaf = &mut nodes[index];
        if let Some(members) = leaf.members.as_mut() {
            if let Err(pos) = members.binary_search(timestamp) {
                members.insert(pos, *timestamp);
            }
        } else if leaf.hash == digest {
            // the leaf held nothing before this insert
            leaf.members = Some(vec![*timestamp]);
        }
        true
    }

    /// Returns `true` if `timestamp` is recorded in its leaf.
    #[must_use]
    pub fn contains(&self, timestamp: &Timestamp) -> bool {
        key_of(timestamp)
            .iter()
            .try_fold(0usize, |index, digit| {
                self.nodes[index].children[usize::from(*digit)]
            })
            .and_then(|leaf| self.nodes[leaf].members.as_ref())
            .is_some_and(|members| members.binary_search(timestamp).is_ok())
    }

    /// The root digest as a signed 32-bit integer.
    #[must_use]
    pub fn root_hash(&self) -> i32 {
        self.nodes[0].hash as i32
    }

    /// Returns `true` for the initial tree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let root = &self.nodes[0];
        root.hash == 0 && root.children.iter().all(Option::is_none)
    }

    /// Number of nodes, including the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.count_from(0)
    }

    fn count_from(&self, index: usize) -> usize {
        1 + self.nodes[index]
            .children
            .iter()
            .flatten()
            .map(|&child| self.count_from(child))
            .sum::<usize>()
    }

    /// Finds the earliest bucket at which two trees disagree.
    ///
    /// Returns `None` when the root digests match. Otherwise the trees are
    /// walked from the root, always descending into the lowest child whose
    /// digests differ (a missing child counts as digest zero), and the lower
    /// boundary of the deepest differing bucket is returned. The result has
    /// counter 0 and the zero node id, so it sorts before every real
    /// timestamp in that millisecond.
    #[must_use]
    pub fn diff(&self, other: &MerkleTree) -> Option<Timestamp> {
        if self.nodes[0].hash == other.nodes[0].hash {
            return None;
        }

        let mut path: Vec<u8> = Vec::with_capacity(DEPTH);
        let mut left = Some(0);
        let mut right = Some(0);

        while path.len() < DEPTH {
            let next = (0..RADIX).find_map(|slot| {
                let l = left.and_then(|i| self.nodes[i].children[slot]);
                let r = right.and_then(|i| other.nodes[i].children[slot]);
                (self.hash_at(l) != other.hash_at(r)).then_some((slot, l, r))
            });
            match next {
                Some((slot, l, r)) => {
                    path.push(slot as u8);
                    left = l;
                    right = r;
                }
                None => break,
            }
        }

        Some(Timestamp::minute_floor(minute_of(&path)))
    }

    fn hash_at(&self, index: Option<usize>) -> u32 {
        index.map_or(0, |i| self.nodes[i].hash)
    }

    /// Serializes to the canonical JSON text.
    #[must_use]
    pub fn serialize(&self) -> String {
        if self.is_empty() {
            return "{}".to_string();
        }
        let mut out = String::with_capacity(self.nodes.len() * 24);
        self.write_node(0, &mut out);
        out
    }

    fn write_node(&self, index: usize, out: &mut String) {
        let node = &self.nodes[index];
        out.push('{');
        for (slot, child) in node.children.iter().enumerate() {
            if let Some(child) = child {
                out.push('"');
                out.push_str(DIGITS[slot]);
                out.push_str("\":");
                self.write_node(*child, out);
                out.push(',');
            }
        }
        out.push_str("\"hash\":");
        out.push_str(&(node.hash as i32).to_string());
        if let Some(members) = node.members.as_ref().filter(|m| !m.is_empty()) {
            out.push_str(",\"timestamps\":[");
            for (i, ts) in members.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(&ts.encode());
                out.push('"');
            }
            out.push(']');
        }
        out.push('}');
    }

    /// Parses the canonical JSON text.
    ///
    /// Keys may appear in any order, a missing `hash` means zero, unsigned
    /// 32-bit hashes are accepted and leaves may omit their timestamp list.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CorruptMerkleTree`] on invalid JSON, a
    /// non-object node, an unknown or repeated key, a bad hash value,
    /// nesting deeper than [`DEPTH`] levels, a timestamp list that is out of
    /// order or outside its leaf, or a digest that does not match the
    /// node's children or timestamps.
    pub fn deserialize(text: &str) -> ProtocolResult<Self> {
        let corrupt = |e: serde_json::Error| ProtocolError::corrupt_merkle_tree(e.to_string());
        let mut nodes = Vec::new();
        let mut de = serde_json::Deserializer::from_str(text);
        NodeSeed {
            nodes: &mut nodes,
            path: [0; DEPTH],
            depth: 0,
        }
        .deserialize(&mut de)
        .map_err(corrupt)?;
        de.end().map_err(corrupt)?;
        Ok(Self {
            nodes: Arc::new(nodes),
        })
    }

    fn eq_from(&self, index: usize, other: &MerkleTree, other_index: usize) -> bool {
        let a = &self.nodes[index];
        let b = &other.nodes[other_index];
        a.hash == b.hash
            && a.children
                .iter()
                .zip(b.children.iter())
                .all(|pair| match pair {
                    (None, None) => true,
                    (Some(x), Some(y)) => self.eq_from(*x, other, *y),
                    _ => false,
                })
    }
}

/// Parses one node object straight into the arena.
struct NodeSeed<'a> {
    nodes: &'a mut Vec<Node>,
    path: Key,
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for NodeSeed<'_> {
    type Value = usize;

    fn deserialize<D>(self, deserializer: D) -> Result<usize, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for NodeSeed<'_> {
    type Value = usize;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a digest node object at depth {}", self.depth)
    }

    fn visit_map<A>(self, mut map: A) -> Result<usize, A::Error>
    where
        A: MapAccess<'de>,
    {
        let Self { nodes, path, depth } = self;
        let index = nodes.len();
        nodes.push(Node::default());

        let mut hash: Option<u32> = None;
        let mut members: Option<Vec<Timestamp>> = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                HASH_KEY => {
                    if hash.is_some() {
                        return Err(repeated_key(&key, depth));
                    }
                    hash = Some(
                        parse_hash(map.next_value()?)
                            .map_err(<A::Error as de::Error>::custom)?,
                    );
                }
                MEMBERS_KEY => {
                    if members.is_some() {
                        return Err(repeated_key(&key, depth));
                    }
                    if depth != DEPTH {
                        return Err(de::Error::custom(format!(
                            "timestamps on a node at depth {depth}"
                        )));
                    }
                    members = Some(map.next_value()?);
                }
                digit => {
                    let slot = DIGITS.iter().position(|d| *d == digit).ok_or_else(|| {
                        <A::Error as de::Error>::custom(format!(
                            "unknown key {digit:?} at depth {depth}"
                        ))
                    })?;
                    if nodes[index].children[slot].is_some() {
                        return Err(repeated_key(&key, depth));
                    }
                    if depth == DEPTH {
                        return Err(de::Error::custom(format!(
                            "nesting deeper than {DEPTH} levels"
                        )));
                    }
                    let mut child_path = path;
                    child_path[depth] = slot as u8;
                    let child = map.next_value_seed(NodeSeed {
                        nodes: &mut *nodes,
                        path: child_path,
                        depth: depth + 1,
                    })?;
                    nodes[index].children[slot] = Some(child);
                }
            }
        }

        let hash = hash.unwrap_or(0);
        let expected = match &members {
            Some(members) => {
                if !members.windows(2).all(|pair| pair[0] < pair[1]) {
                    return Err(de::Error::custom("leaf timestamps are not strictly ascending"));
                }
                if let Some(stray) = members.iter().find(|ts| key_of(ts) != path) {
                    return Err(de::Error::custom(format!("timestamp {stray} is outside its leaf")));
                }
                Some(members.iter().fold(0, |acc, ts| acc ^ leaf_digest(ts)))
            }
            // a leaf without a list carries a digest that cannot be checked
            None if depth == DEPTH => None,
            None => Some(
                nodes[index]
                    .children
                    .iter()
                    .flatten()
                    .fold(0, |acc, &child| acc ^ nodes[child].hash),
            ),
        };
        if expected.is_some_and(|expected| expected != hash) {
            return Err(de::Error::custom(format!(
                "digest {} at depth {depth} does not match its contents",
                hash as i32
            )));
        }

        nodes[index].hash = hash;
        nodes[index].members = members;
        Ok(index)
    }
}

fn repeated_key<E: de::Error>(key: &str, depth: usize) -> E {
    E::custom(format!("repeated key {key:?} at depth {depth}"))
}

fn parse_hash(n: i64) -> ProtocolResult<u32> {
    if !(i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&n) {
        return Err(ProtocolError::corrupt_merkle_tree(format!(
            "hash {n} is out of range"
        )));
    }
    Ok(n as u32)
}

fn leaf_digest(timestamp: &Timestamp) -> u32 {
    murmur3_x86_32(timestamp.encode().as_bytes(), 0)
}

fn key_of(timestamp: &Timestamp) -> Key {
    let mut minute = timestamp.minute();
    let mut key = [0u8; DEPTH];
    for digit in key.iter_mut().rev() {
        *digit = (minute % RADIX as u64) as u8;
        minute /= RADIX as u64;
    }
    key
}

fn minute_of(path: &[u8]) -> u64 {
    (0..DEPTH).fold(0u64, |acc, i| {
        acc * RADIX as u64 + u64::from(path.get(i).copied().unwrap_or(0))
    })
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for MerkleTree {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes) || self.eq_from(0, other, 0)
    }
}

impl Eq for MerkleTree {}

impl fmt::Debug for MerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleTree")
            .field("root_hash", &self.root_hash())
            .field("nodes", &self.node_count())
            .finish()
    }
}
