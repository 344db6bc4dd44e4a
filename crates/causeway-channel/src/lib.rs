//! # Causeway Channel
//!
//! Causal reliable delivery over an unreliable, unordered, at-most-once
//! publish/subscribe transport, without a central sequencer.
//!
//! ## Overview
//!
//! A [`MessageChannel`] turns raw transport publishes into a channel with:
//!
//! - **Causal ordering**: every message carries a bounded window of prior
//!   message ids; receivers buffer until dependencies are met.
//! - **Duplicate suppression**: content-addressed ids, receive-side dedup.
//! - **Probabilistic acknowledgement**: causal-history mention is a full
//!   acknowledgement; bloom-filter sightings accumulate into one.
//!
//! Delivery is at-least-once with receiver-side deduplication; ordering is
//! a causal partial order with a deterministic `(timestamp, message_id)`
//! tie-break. Retry and heartbeat cadence stay with the caller.
//!
//! ## Usage
//!
//! ```rust
//! use bytes::Bytes;
//! use causeway_channel::{
//!     ChannelConfig, ChannelId, MemoryPublisher, MessageChannel, ParticipantId,
//! };
//!
//! # async fn example() {
//! let mut channel = MessageChannel::new(
//!     ChannelId::from("my-channel"),
//!     ParticipantId::from("alice"),
//!     ChannelConfig::default(),
//! )
//! .unwrap();
//!
//! // Queue operations...
//! let publisher = MemoryPublisher::new();
//! channel.send_message(Bytes::from_static(b"hello"), Some(Box::new(publisher)));
//!
//! // ...and drain them. The embedding application drives this loop.
//! channel.process_tasks().await;
//! # }
//! ```
//!
//! ## Control Flow
//!
//! ```text
//! producer ──send_message──▶ task queue ──process_tasks──▶ handler
//!                                                            │ clock++, snapshot history+filter
//!                                                            │ buffer, publish(message)
//!                                                            ▼
//!                                                on success: commit to log+filter
//!
//! transport ──receive_message──▶ task queue ──process_tasks──▶ handler
//!                                                               │ dedup, ack review
//!                                                               ▼
//!                                        deps met? deliver : buffer for sweep
//! ```
//!
//! Periodic external timers drive [`MessageChannel::sweep_incoming_buffer`],
//! [`MessageChannel::sweep_outgoing_buffer`], and
//! [`MessageChannel::send_sync_message`] to keep acknowledgement state
//! converging.

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod publish;
pub mod queue;
pub mod repair;

pub use channel::{LocalHistoryRecord, MessageChannel, OutgoingBufferSweep};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use events::{ChannelEvent, DeliveryOrigin, EVENT_CHANNEL_CAPACITY};
pub use publish::{BoxPublisher, MemoryPublisher, PublishOutcome, Publisher};
pub use queue::TaskKind;
pub use repair::{RepairConfig, RepairManager};

// Re-export the companion crates callers always need alongside the channel.
pub use causeway_bloom::{BloomFilter, BloomFilterOptions};
pub use causeway_core::{ChannelId, HistoryEntry, Message, MessageId, ParticipantId};
