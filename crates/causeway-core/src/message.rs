//! The wire-shaped message model.
//!
//! A [`Message`] is classified by two orthogonal facts: whether it carries a
//! Lamport timestamp and whether its content is empty.
//!
//! | timestamp | content   | classification |
//! |-----------|-----------|----------------|
//! | present   | non-empty | content        |
//! | present   | empty     | sync           |
//! | absent    | non-empty | ephemeral      |
//!
//! Sync messages carry only clock, causal-history, and bloom-filter state;
//! ephemeral messages carry only content and are delivered immediately on
//! receipt with no ordering or acknowledgement guarantees.
//!
//! Serialization of the message itself is delegated to the embedding
//! application's codec; the types here only derive `serde` traits.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, MessageId, ParticipantId};

/// A reference to a previously delivered message.
///
/// Attached to outgoing messages as causal history ("delivered after
/// these"). The retrieval hint is opaque data a store-style collaborator
/// can use to fetch the referenced message when it is missing locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The referenced message.
    pub message_id: MessageId,
    /// Opaque handle for on-demand retrieval of the referenced message.
    pub retrieval_hint: Option<Bytes>,
    /// Who originally sent the referenced message, when known. Used by the
    /// repair layer for response-group assignment.
    pub sender_id: Option<ParticipantId>,
}

impl HistoryEntry {
    /// Create an entry carrying only the message id.
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            retrieval_hint: None,
            sender_id: None,
        }
    }

    /// Attach a retrieval hint.
    pub fn with_retrieval_hint(mut self, hint: Bytes) -> Self {
        self.retrieval_hint = Some(hint);
        self
    }

    /// Attach the original sender.
    pub fn with_sender(mut self, sender_id: ParticipantId) -> Self {
        self.sender_id = Some(sender_id);
        self
    }
}

/// A channel message.
///
/// The field semantics are the only protocol format this crate owns; how
/// the struct is framed on the wire belongs to the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Content-address of `content`.
    pub message_id: MessageId,
    /// The channel this message belongs to.
    pub channel_id: ChannelId,
    /// The participant that sent this message.
    pub sender_id: ParticipantId,
    /// Logical send time. Absent for ephemeral messages.
    pub lamport_timestamp: Option<u64>,
    /// The sender's last few local-history entries at send time.
    pub causal_history: Vec<HistoryEntry>,
    /// Serialized snapshot of the sender's bloom filter. Absent for
    /// ephemeral messages.
    pub bloom_filter: Option<Bytes>,
    /// Raw payload. Empty for sync messages.
    pub content: Bytes,
}

impl Message {
    /// Build a content message. The id is computed from the payload.
    pub fn content(
        channel_id: ChannelId,
        sender_id: ParticipantId,
        lamport_timestamp: u64,
        causal_history: Vec<HistoryEntry>,
        bloom_filter: Bytes,
        content: Bytes,
    ) -> Self {
        Self {
            message_id: MessageId::compute(&content),
            channel_id,
            sender_id,
            lamport_timestamp: Some(lamport_timestamp),
            causal_history,
            bloom_filter: Some(bloom_filter),
            content,
        }
    }

    /// Build a sync message: empty content, real timestamp.
    pub fn sync(
        channel_id: ChannelId,
        sender_id: ParticipantId,
        lamport_timestamp: u64,
        causal_history: Vec<HistoryEntry>,
        bloom_filter: Bytes,
    ) -> Self {
        Self {
            message_id: MessageId::compute(&[]),
            channel_id,
            sender_id,
            lamport_timestamp: Some(lamport_timestamp),
            causal_history,
            bloom_filter: Some(bloom_filter),
            content: Bytes::new(),
        }
    }

    /// Build an ephemeral message: no timestamp, no history, no filter.
    pub fn ephemeral(channel_id: ChannelId, sender_id: ParticipantId, content: Bytes) -> Self {
        Self {
            message_id: MessageId::compute(&content),
            channel_id,
            sender_id,
            lamport_timestamp: None,
            causal_history: Vec::new(),
            bloom_filter: None,
            content,
        }
    }

    /// A timestamped message with a payload.
    pub fn is_content(&self) -> bool {
        self.lamport_timestamp.is_some() && !self.content.is_empty()
    }

    /// A timestamped message without a payload, carrying only
    /// acknowledgement state.
    pub fn is_sync(&self) -> bool {
        self.lamport_timestamp.is_some() && self.content.is_empty()
    }

    /// A fire-and-forget message outside the causal order.
    pub fn is_ephemeral(&self) -> bool {
        self.lamport_timestamp.is_none() && !self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ChannelId, ParticipantId) {
        (ChannelId::from("room"), ParticipantId::from("alice"))
    }

    #[test]
    fn test_content_message_classification() {
        let (channel, sender) = ids();
        let msg = Message::content(
            channel,
            sender,
            1,
            vec![],
            Bytes::from_static(&[0u8; 4]),
            Bytes::from_static(b"payload"),
        );
        assert!(msg.is_content());
        assert!(!msg.is_sync());
        assert!(!msg.is_ephemeral());
        assert_eq!(msg.message_id, MessageId::compute(b"payload"));
    }

    #[test]
    fn test_sync_message_classification() {
        let (channel, sender) = ids();
        let msg = Message::sync(channel, sender, 7, vec![], Bytes::new());
        assert!(msg.is_sync());
        assert!(!msg.is_content());
        assert!(!msg.is_ephemeral());
        assert_eq!(msg.message_id, MessageId::compute(&[]));
    }

    #[test]
    fn test_ephemeral_message_classification() {
        let (channel, sender) = ids();
        let msg = Message::ephemeral(channel, sender, Bytes::from_static(b"now"));
        assert!(msg.is_ephemeral());
        assert!(!msg.is_content());
        assert!(!msg.is_sync());
        assert!(msg.lamport_timestamp.is_none());
        assert!(msg.bloom_filter.is_none());
        assert!(msg.causal_history.is_empty());
    }

    #[test]
    fn test_all_sync_messages_share_an_id() {
        let (channel, sender) = ids();
        let a = Message::sync(channel.clone(), sender.clone(), 1, vec![], Bytes::new());
        let b = Message::sync(channel, sender, 2, vec![], Bytes::new());
        assert_eq!(a.message_id, b.message_id);
    }

    #[test]
    fn test_codec_roundtrip_preserves_absent_fields() {
        // The codec is the collaborator's concern; this only checks the
        // serde shape survives a real codec, including absent timestamp
        // and filter on ephemeral messages.
        let (channel, sender) = ids();
        let msg = Message::ephemeral(channel, sender, Bytes::from_static(b"blip"));

        let mut wire = Vec::new();
        ciborium::into_writer(&msg, &mut wire).unwrap();
        let decoded: Message = ciborium::from_reader(wire.as_slice()).unwrap();

        assert_eq!(decoded, msg);
        assert!(decoded.lamport_timestamp.is_none());
        assert!(decoded.bloom_filter.is_none());
    }
}
