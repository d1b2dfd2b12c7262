//! Property-based tests for the chatsync wire records.
//!
//! Uses proptest to verify:
//! 1. Any `Message` survives a JSON encode → decode round-trip.
//! 2. `conversation_order` always yields strictly ascending ids and keeps
//!    every id it was given.
//! 3. Arbitrary bytes never cause a panic when decoding records.
//! 4. `validate_content` accepts exactly the non-blank, bounded bodies.

use std::collections::BTreeSet;

use chatsync_proto::message::{
    MAX_CONTENT_CHARS, Message, MessageId, conversation_order, validate_content,
};
use chatsync_proto::presence::PresenceRecord;
use chatsync_proto::user::UserId;
use chrono::DateTime;
use proptest::prelude::*;

/// Strategy for generating arbitrary `Message` values with second-precision
/// timestamps inside a sane range.
fn arb_message() -> impl Strategy<Value = Message> {
    (
        1i64..10_000,
        1i64..50,
        1i64..50,
        ".{0,256}",
        0i64..4_000_000_000,
        any::<bool>(),
    )
        .prop_map(|(id, sender, receiver, content, secs, is_read)| Message {
            id: MessageId::new(id),
            sender: UserId::new(sender),
            receiver: UserId::new(receiver),
            content,
            timestamp: DateTime::from_timestamp(secs, 0).unwrap_or_default(),
            is_read,
        })
}

proptest! {
    #[test]
    fn message_json_round_trip(msg in arb_message()) {
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(msg, decoded);
    }

    #[test]
    fn conversation_order_is_strictly_ascending(
        messages in prop::collection::vec(arb_message(), 0..64)
    ) {
        let input_ids: BTreeSet<MessageId> = messages.iter().map(|m| m.id).collect();
        let ordered = conversation_order(messages);

        for pair in ordered.windows(2) {
            prop_assert!(pair[0].id < pair[1].id);
        }
        let output_ids: BTreeSet<MessageId> = ordered.iter().map(|m| m.id).collect();
        prop_assert_eq!(input_ids, output_ids);
    }

    #[test]
    fn decode_random_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = serde_json::from_slice::<Message>(&bytes);
        let _ = serde_json::from_slice::<Vec<PresenceRecord>>(&bytes);
    }

    #[test]
    fn validation_matches_blank_and_length_rules(content in "\\PC{0,64}|[ \\t\\n]{0,8}") {
        let expected_ok = !content.trim().is_empty() && content.chars().count() <= MAX_CONTENT_CHARS;
        prop_assert_eq!(validate_content(&content).is_ok(), expected_ok);
    }
}
