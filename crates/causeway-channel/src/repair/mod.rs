//! Distributed retransmission scheduling.
//!
//! When causal dependencies stay missing, every participant that noticed
//! the gap would otherwise ask for the same message at the same moment, and
//! every holder would answer at once. This layer spreads that load without
//! coordination:
//!
//! - a missing message becomes *requestable* after a per-(participant,
//!   message) deterministic delay inside `[t_min, t_max)`;
//! - a request is *answerable* after a delay derived from the XOR distance
//!   between the answering participant and the original sender, so closer
//!   participants answer sooner;
//! - with more than one response group, only participants hashing into the
//!   original sender's group answer at all.
//!
//! The layer schedules; it never transmits. Due requests surface through
//! [`RepairManager::requests_due`] and due responses resolve full messages
//! through a caller-supplied lookup (the store-collaborator boundary).

pub mod buffers;

use std::time::Duration;

use causeway_core::{HistoryEntry, Message, MessageId, ParticipantId};
use tokio::time::Instant;

use self::buffers::{IncomingRepairBuffer, OutgoingRepairBuffer};

/// One response group per this many participants.
pub const PARTICIPANTS_PER_RESPONSE_GROUP: u64 = 128;

/// Domain prefix for repair-layer hashing.
const REPAIR_HASH_DOMAIN: &[u8] = b"causeway-repair-v1:";

/// Configuration for repair scheduling.
#[derive(Debug, Clone)]
pub struct RepairConfig {
    /// Minimum wait before requesting a missing message.
    pub t_min: Duration,
    /// Upper bound of the request window; also bounds response delays.
    pub t_max: Duration,
    /// Response groups for load distribution.
    pub num_response_groups: u64,
    /// Capacity of each repair buffer.
    pub buffer_size: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            t_min: Duration::from_secs(30),
            t_max: Duration::from_secs(120),
            num_response_groups: 1,
            buffer_size: 1000,
        }
    }
}

/// Schedules repair requests and responses for one participant.
#[derive(Debug)]
pub struct RepairManager {
    participant_id: ParticipantId,
    config: RepairConfig,
    outgoing: OutgoingRepairBuffer,
    incoming: IncomingRepairBuffer,
}

impl RepairManager {
    /// Create a manager for a participant.
    pub fn new(participant_id: ParticipantId, config: RepairConfig) -> Self {
        let outgoing = OutgoingRepairBuffer::new(config.buffer_size);
        let incoming = IncomingRepairBuffer::new(config.buffer_size);
        Self {
            participant_id,
            config,
            outgoing,
            incoming,
        }
    }

    /// Deterministic wait before this participant requests a missing
    /// message: `hash(participant, id) mod (t_max - t_min) + t_min`.
    pub fn request_delay(&self, message_id: &MessageId) -> Duration {
        let range = self
            .config
            .t_max
            .saturating_sub(self.config.t_min)
            .as_millis()
            .max(1) as u64;
        let offset = combined_hash(&self.participant_id, message_id) % range;
        self.config.t_min + Duration::from_millis(offset)
    }

    /// Deterministic wait before this participant answers a request:
    /// `(xor_distance(participant, sender) * hash(id)) mod t_max`.
    pub fn response_delay(&self, sender_id: &ParticipantId, message_id: &MessageId) -> Duration {
        let t_max = self.config.t_max.as_millis().max(1) as u128;
        let distance = xor_distance(&self.participant_id, sender_id) as u128;
        let product = distance.wrapping_mul(id_hash(message_id) as u128);
        Duration::from_millis((product % t_max) as u64)
    }

    /// Whether this participant answers requests for a message originally
    /// sent by `sender_id`.
    pub fn is_in_response_group(&self, sender_id: &ParticipantId, message_id: &MessageId) -> bool {
        let groups = self.config.num_response_groups;
        if groups <= 1 {
            return true;
        }
        combined_hash(&self.participant_id, message_id) % groups
            == combined_hash(sender_id, message_id) % groups
    }

    /// Queue repair requests for missing dependencies. Returns the ids
    /// newly queued (already-buffered ids keep their original due time).
    pub fn mark_dependencies_missing(
        &mut self,
        entries: &[HistoryEntry],
        now: Instant,
    ) -> Vec<MessageId> {
        let mut queued = Vec::new();
        for entry in entries {
            let due = now + self.request_delay(&entry.message_id);
            if self.outgoing.add(entry.clone(), due) {
                tracing::debug!(message_id = %entry.message_id, "queued repair request");
                queued.push(entry.message_id);
            }
        }
        queued
    }

    /// A message arrived: nothing left to request or answer for it.
    pub fn mark_message_received(&mut self, message_id: &MessageId) {
        self.outgoing.remove(message_id);
        self.incoming.remove(message_id);
    }

    /// Repair requests whose stagger delay has elapsed, up to `max`.
    /// Handed-out requests stay buffered until the message arrives.
    pub fn requests_due(&mut self, now: Instant, max: usize) -> Vec<HistoryEntry> {
        self.outgoing.eligible(now, max)
    }

    /// Record repair requests observed from other participants.
    ///
    /// Our own pending request for an id is dropped (someone else is
    /// already asking). A response is queued only when `have` reports the
    /// message locally and this participant is in the sender's response
    /// group. Returns the ids newly queued for response.
    pub fn process_requests(
        &mut self,
        requests: &[HistoryEntry],
        now: Instant,
        mut have: impl FnMut(&MessageId) -> bool,
    ) -> Vec<MessageId> {
        let mut queued = Vec::new();
        for request in requests {
            self.outgoing.remove(&request.message_id);

            if !have(&request.message_id) {
                tracing::debug!(message_id = %request.message_id, "cannot fulfill repair, not held locally");
                continue;
            }
            let Some(sender_id) = &request.sender_id else {
                tracing::warn!(message_id = %request.message_id, "repair request without sender, response group unknown");
                continue;
            };
            if !self.is_in_response_group(sender_id, &request.message_id) {
                continue;
            }
            let due = now + self.response_delay(sender_id, &request.message_id);
            if self.incoming.add(request.clone(), due) {
                queued.push(request.message_id);
            }
        }
        queued
    }

    /// Repair responses whose delay has elapsed, resolved to full messages
    /// through `lookup`. Unresolvable ids are dropped with a warning.
    pub fn responses_due(
        &mut self,
        now: Instant,
        mut lookup: impl FnMut(&MessageId) -> Option<Message>,
    ) -> Vec<Message> {
        self.incoming
            .ready(now)
            .into_iter()
            .filter_map(|entry| match lookup(&entry.message_id) {
                Some(message) => Some(message),
                None => {
                    tracing::warn!(message_id = %entry.message_id, "repair response no longer resolvable");
                    None
                }
            })
            .collect()
    }

    /// Rescale response groups as participant count changes.
    pub fn update_response_groups(&mut self, num_participants: u64) {
        self.config.num_response_groups =
            (num_participants / PARTICIPANTS_PER_RESPONSE_GROUP).max(1);
    }

    /// Count of pending outgoing repair requests.
    pub fn pending_requests(&self) -> usize {
        self.outgoing.len()
    }

    /// Count of pending repair responses.
    pub fn pending_responses(&self) -> usize {
        self.incoming.len()
    }

    /// Whether a specific message has a pending repair request.
    pub fn is_pending_request(&self, message_id: &MessageId) -> bool {
        self.outgoing.contains(message_id)
    }

    /// Earliest scheduled request time.
    pub fn next_request_at(&self) -> Option<Instant> {
        self.outgoing.next_due()
    }

    /// Earliest scheduled response time.
    pub fn next_response_at(&self) -> Option<Instant> {
        self.incoming.next_due()
    }

    /// Drop all scheduled work.
    pub fn clear(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
    }
}

fn hash64(parts: &[&[u8]]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(REPAIR_HASH_DOMAIN);
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

fn combined_hash(participant_id: &ParticipantId, message_id: &MessageId) -> u64 {
    hash64(&[participant_id.as_str().as_bytes(), message_id.as_bytes()])
}

fn id_hash(message_id: &MessageId) -> u64 {
    hash64(&[message_id.as_bytes()])
}

fn xor_distance(a: &ParticipantId, b: &ParticipantId) -> u64 {
    hash64(&[a.as_str().as_bytes()]) ^ hash64(&[b.as_str().as_bytes()])
}
