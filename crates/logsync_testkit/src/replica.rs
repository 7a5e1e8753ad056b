//! A client replica for multi-node convergence tests.
//!
//! Keeps a local log and digest, stamps writes with a hybrid clock, and
//! speaks the request/response envelopes. Transport is left to the caller.

use bytes::Bytes;
use logsync_protocol::{
    ClockConfig, ManualClock, MerkleTree, Message, NodeId, OwnerId, ProtocolResult, SyncRequest,
    SyncResponse, Timestamp, TimestampGenerator,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One node's copy of an owner's log.
#[derive(Debug)]
pub struct Replica {
    owner: OwnerId,
    generator: TimestampGenerator<Arc<ManualClock>>,
    log: BTreeMap<Timestamp, Bytes>,
    tree: MerkleTree,
    pending: Vec<Message>,
}

impl Replica {
    /// Creates an empty replica reading time from `clock`.
    pub fn new(owner: OwnerId, node: NodeId, clock: Arc<ManualClock>) -> Self {
        Self {
            owner,
            generator: TimestampGenerator::new(node, clock, ClockConfig::default()),
            log: BTreeMap::new(),
            tree: MerkleTree::empty(),
            pending: Vec::new(),
        }
    }

    /// This replica's node id.
    pub fn node(&self) -> NodeId {
        self.generator.node()
    }

    /// The local digest.
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// Every message held locally, ascending.
    pub fn messages(&self) -> Vec<Message> {
        self.log
            .iter()
            .map(|(ts, content)| Message::new(*ts, content.clone()))
            .collect()
    }

    /// Messages written locally and not yet acknowledged.
    pub fn pending(&self) -> &[Message] {
        &self.pending
    }

    /// Records a local write and queues it for upload.
    ///
    /// # Errors
    ///
    /// Propagates clock failures from the timestamp generator.
    pub fn write(&mut self, content: impl Into<Bytes>) -> ProtocolResult<Timestamp> {
        let timestamp = self.generator.generate()?;
        let message = Message::new(timestamp, content);
        self.log.insert(timestamp, message.content.clone());
        self.tree.insert_in_place(&timestamp);
        self.pending.push(message);
        Ok(timestamp)
    }

    /// Builds the next request: the local digest plus pending writes.
    pub fn request(&self) -> SyncRequest {
        self.pending.iter().cloned().fold(
            SyncRequest::new(self.owner.clone(), self.node(), &self.tree),
            SyncRequest::with_message,
        )
    }

    /// Applies a response and returns how many messages were new.
    ///
    /// Pending writes count as acknowledged once a response arrives.
    ///
    /// # Errors
    ///
    /// Propagates clock failures when merging remote timestamps.
    pub fn apply(&mut self, response: &SyncResponse) -> ProtocolResult<usize> {
        self.pending.clear();
        let mut added = 0;
        for message in &response.messages {
            if self.log.contains_key(&message.timestamp) {
                continue;
            }
            self.generator.receive(message.timestamp)?;
            self.log.insert(message.timestamp, message.content.clone());
            self.tree.insert_in_place(&message.timestamp);
            added += 1;
        }
        Ok(added)
    }

    /// True when the local digest matches the one in `response`.
    ///
    /// # Errors
    ///
    /// Fails if the response digest does not parse.
    pub fn matches(&self, response: &SyncResponse) -> ProtocolResult<bool> {
        Ok(response.tree()? == self.tree)
    }

    /// Syncs through `transport` until a round brings nothing new and the
    /// digests agree. Returns the number of rounds, or `None` if
    /// `max_rounds` was not enough.
    ///
    /// # Panics
    ///
    /// Panics if the transport or the replica fails.
    pub fn sync_until_converged<F, E>(&mut self, mut transport: F, max_rounds: usize) -> Option<usize>
    where
        F: FnMut(SyncRequest) -> Result<SyncResponse, E>,
        E: std::fmt::Debug,
    {
        for round in 1..=max_rounds {
            let response = transport(self.request()).expect("transport failed");
            let added = self.apply(&response).expect("apply failed");
            if added == 0 && self.matches(&response).expect("corrupt response digest") {
                return Some(round);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(node: u64, clock: &Arc<ManualClock>) -> Replica {
        Replica::new(OwnerId::new("u1").unwrap(), NodeId::new(node), Arc::clone(clock))
    }

    #[test]
    fn writes_are_queued_and_folded() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut a = replica(1, &clock);
        let t1 = a.write("one").unwrap();
        let t2 = a.write("two").unwrap();
        assert!(t1 < t2);
        assert_eq!(a.pending().len(), 2);
        assert_eq!(a.request().messages.len(), 2);
        assert_eq!(a.tree(), &MerkleTree::from_timestamps([t1, t2]));
    }

    #[test]
    fn apply_skips_known_messages() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut a = replica(1, &clock);
        let mut b = replica(2, &clock);
        let mine = a.write("mine").unwrap();
        let theirs = b.write("theirs").unwrap();

        let response = SyncResponse {
            merkle_tree: MerkleTree::from_timestamps([mine, theirs]).serialize(),
            messages: b.messages(),
        };
        assert_eq!(a.apply(&response).unwrap(), 1);
        assert_eq!(a.apply(&response).unwrap(), 0);
        assert!(a.pending().is_empty());
        assert!(a.matches(&response).unwrap());
    }
}
