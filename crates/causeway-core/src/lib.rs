//! # Causeway Core
//!
//! Pure primitives for Causeway: the message model, identifiers, and
//! content addressing.
//!
//! This crate contains no I/O, no async, and no channel state. It is pure
//! computation over the wire-shaped data the protocol exchanges.
//!
//! ## Key Types
//!
//! - [`Message`] - The unit of exchange on a channel
//! - [`MessageId`] - Content-addressed identifier (Blake3 hash of payload)
//! - [`HistoryEntry`] - A causal reference to a delivered message
//! - [`ChannelId`] / [`ParticipantId`] - Scope and sender identifiers
//!
//! ## Message Classification
//!
//! A message is *content* (timestamp + payload), *sync* (timestamp, empty
//! payload, carries only acknowledgement state), or *ephemeral* (payload
//! without a timestamp, outside the causal order). See [`message`].

pub mod message;
pub mod types;

pub use message::{HistoryEntry, Message};
pub use types::{ChannelId, MessageId, ParticipantId};
