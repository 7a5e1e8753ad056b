//! Property-based test generators using proptest.
//!
//! Generated timestamps never carry the reserved all-zero node id.

use bytes::Bytes;
use logsync_protocol::{Message, NodeId, OwnerId, Timestamp};
use proptest::prelude::*;

/// Strategy for node ids, excluding the reserved zero id.
pub fn node_id_strategy() -> impl Strategy<Value = NodeId> {
    (1..=u64::MAX).prop_map(NodeId::new)
}

/// Strategy for a small pool of node ids, so collisions happen.
pub fn few_nodes_strategy() -> impl Strategy<Value = NodeId> {
    (1u64..=4).prop_map(NodeId::new)
}

/// Strategy for owner ids.
pub fn owner_id_strategy() -> impl Strategy<Value = OwnerId> {
    "[a-z][a-z0-9_-]{0,15}".prop_filter_map("owner id", |s| OwnerId::new(s).ok())
}

/// Strategy for any representable timestamp.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (0..=Timestamp::MAX_MILLIS, any::<u16>(), node_id_strategy())
        .prop_filter_map("timestamp", |(millis, counter, node)| {
            Timestamp::new(millis, counter, node).ok()
        })
}

/// Strategy for timestamps within `minutes` minutes of a fixed instant.
///
/// Clustered timestamps share tree paths, which exercises the deeper
/// levels of the digest.
pub fn clustered_timestamp_strategy(minutes: u64) -> impl Strategy<Value = Timestamp> {
    const BASE: u64 = 1_700_000_000_000;
    let span = minutes.max(1) * 60_000;
    (0..span, 0u16..8, few_nodes_strategy()).prop_filter_map(
        "timestamp",
        |(offset, counter, node)| Timestamp::new(BASE + offset, counter, node).ok(),
    )
}

/// Strategy for message content.
pub fn content_strategy() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..64).prop_map(Bytes::from)
}

/// Strategy for messages with clustered timestamps.
pub fn message_strategy() -> impl Strategy<Value = Message> {
    (clustered_timestamp_strategy(240), content_strategy())
        .prop_map(|(timestamp, content)| Message::new(timestamp, content))
}

/// Strategy for batches of messages.
pub fn message_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec(message_strategy(), 0..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_nodes_are_not_reserved(node in node_id_strategy()) {
            prop_assert_ne!(node, NodeId::ZERO);
        }

        #[test]
        fn generated_timestamps_roundtrip(ts in timestamp_strategy()) {
            prop_assert_eq!(Timestamp::decode(&ts.encode()).unwrap(), ts);
        }

        #[test]
        fn clustered_timestamps_stay_in_window(ts in clustered_timestamp_strategy(10)) {
            prop_assert!(ts.millis() >= 1_700_000_000_000);
            prop_assert!(ts.millis() < 1_700_000_000_000 + 600_000);
        }
    }
}
