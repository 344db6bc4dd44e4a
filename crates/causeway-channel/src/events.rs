//! Typed channel lifecycle notifications.
//!
//! External code (UIs, metrics, retransmission drivers) observes channel
//! transitions by subscribing here instead of polling internal state. The
//! stream is backed by `tokio::sync::broadcast`: emission never blocks or
//! fails the emitting operation, and a subscriber that falls behind loses
//! the oldest events.

use causeway_core::{HistoryEntry, Message, MessageId};
use tokio::sync::broadcast;

use crate::queue::TaskKind;

/// How many events are retained for slow subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Whether a delivered message originated locally or from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOrigin {
    /// The message was sent by this channel.
    Sent,
    /// The message was received from a peer.
    Received,
}

/// Lifecycle events emitted by a [`MessageChannel`](crate::MessageChannel).
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A sent message was published successfully and committed to the
    /// local log.
    MessageSent { message: Message },
    /// A timestamped content message was accepted from the transport.
    MessageReceived { message: Message },
    /// A sync message (empty content, real timestamp) was accepted.
    SyncReceived { message: Message },
    /// An ephemeral message was delivered on receipt, outside the causal
    /// order.
    EphemeralDelivered { message: Message },
    /// A message entered the local history.
    MessageDelivered {
        message_id: MessageId,
        origin: DeliveryOrigin,
    },
    /// An in-flight message was fully acknowledged via a peer's causal
    /// history.
    MessageAcknowledged { message_id: MessageId },
    /// An in-flight message appeared in a peer's bloom filter; `count`
    /// sightings so far.
    PartialAcknowledgement { message_id: MessageId, count: u32 },
    /// Dependencies still unmet after an incoming-buffer sweep.
    MissedMessages { entries: Vec<HistoryEntry> },
    /// A sync message was published.
    SyncSent { message: Message },
    /// The repair layer scheduled a retransmission request.
    RepairRequestQueued { message_id: MessageId },
    /// The repair layer scheduled a retransmission response.
    RepairResponseQueued { message_id: MessageId },
    /// A queued task failed; the drain continued with the remaining tasks.
    TaskFailed { kind: TaskKind, error: String },
}

/// Broadcast-backed emitter owned by the channel.
#[derive(Debug)]
pub(crate) struct EventEmitter {
    tx: broadcast::Sender<ChannelEvent>,
}

impl EventEmitter {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Dropped silently when nobody is subscribed.
    pub(crate) fn emit(&self, event: ChannelEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("channel event dropped: no subscribers");
        }
    }
}
