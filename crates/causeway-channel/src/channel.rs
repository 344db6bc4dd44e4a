//! The message channel state machine.
//!
//! One [`MessageChannel`] instance owns all protocol state for one channel
//! id: the Lamport clock, the local delivery log, the in-flight and pending
//! buffers, the acknowledgement digest, and the task queue that serializes
//! every mutation. Distinct instances share nothing and may run
//! concurrently.
//!
//! Per locally sent message:
//! `Created -> Buffered(outgoing) -> {Unacknowledged <-> PartiallyAcknowledged(n) -> Acknowledged(removed)}`
//!
//! Per received message:
//! `Received(dedup-checked) -> {DeliveredImmediately(ephemeral) | PendingDeps(buffered) -> Delivered | Lost(timeout)}`

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::Instant;

use causeway_bloom::BloomFilter;
use causeway_core::{ChannelId, HistoryEntry, Message, MessageId, ParticipantId};

use crate::config::ChannelConfig;
use crate::error::Result;
use crate::events::{ChannelEvent, DeliveryOrigin, EventEmitter, EVENT_CHANNEL_CAPACITY};
use crate::publish::BoxPublisher;
use crate::queue::{Task, TaskQueue};
use crate::repair::RepairManager;

/// A delivered message at its place in the local causal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHistoryRecord {
    /// The message's Lamport timestamp.
    pub timestamp: u64,
    /// Id, retrieval hint, and sender of the delivered message.
    pub entry: HistoryEntry,
}

/// Partition of the outgoing buffer by acknowledgement status, for
/// caller-driven republish policy.
#[derive(Debug, Default)]
pub struct OutgoingBufferSweep {
    /// No acknowledgement signal at all; candidates for republish.
    pub unacknowledged: Vec<Message>,
    /// At least one bloom-filter sighting; probably arriving.
    pub possibly_acknowledged: Vec<Message>,
}

/// A causal reliable-delivery channel over an unreliable transport.
pub struct MessageChannel {
    channel_id: ChannelId,
    sender_id: ParticipantId,
    config: ChannelConfig,
    lamport_timestamp: u64,
    filter: BloomFilter,
    outgoing_buffer: Vec<Message>,
    acknowledgements: HashMap<MessageId, u32>,
    incoming_buffer: Vec<Message>,
    local_history: Vec<LocalHistoryRecord>,
    time_received: HashMap<MessageId, Instant>,
    own_message_ids: HashSet<MessageId>,
    tasks: TaskQueue,
    events: EventEmitter,
    repair: Option<RepairManager>,
}

impl MessageChannel {
    /// Create a channel for `channel_id`, sending as `sender_id`.
    pub fn new(
        channel_id: ChannelId,
        sender_id: ParticipantId,
        config: ChannelConfig,
    ) -> Result<Self> {
        let filter = BloomFilter::new(config.bloom)?;
        let repair = config
            .repair
            .clone()
            .map(|repair_config| RepairManager::new(sender_id.clone(), repair_config));
        Ok(Self {
            channel_id,
            sender_id,
            config,
            lamport_timestamp: 0,
            filter,
            outgoing_buffer: Vec::new(),
            acknowledgements: HashMap::new(),
            incoming_buffer: Vec::new(),
            local_history: Vec::new(),
            time_received: HashMap::new(),
            own_message_ids: HashSet::new(),
            tasks: TaskQueue::default(),
            events: EventEmitter::new(EVENT_CHANNEL_CAPACITY),
            repair,
        })
    }

    /// The content-address a payload would be sent under.
    pub fn message_id(payload: &[u8]) -> MessageId {
        MessageId::compute(payload)
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Queue a payload for causal, acknowledged delivery. The message is
    /// built and published when [`process_tasks`](Self::process_tasks)
    /// drains the queue.
    pub fn send_message(&mut self, payload: Bytes, publisher: Option<BoxPublisher>) {
        self.tasks.enqueue(Task::Send { payload, publisher });
    }

    /// Queue a fire-and-forget payload: no timestamp, no causal history,
    /// no acknowledgement, delivered immediately by receivers.
    pub fn send_ephemeral_message(&mut self, payload: Bytes, publisher: Option<BoxPublisher>) {
        self.tasks.enqueue(Task::SendEphemeral { payload, publisher });
    }

    /// Queue an inbound message for processing. This is the entry point
    /// the transport's decode path calls for every message addressed to
    /// this channel.
    pub fn receive_message(&mut self, message: Message) {
        self.tasks.enqueue(Task::Receive { message });
    }

    /// Drain the task queue, fully completing each operation (publish
    /// await included) before popping the next. A failing task emits
    /// [`ChannelEvent::TaskFailed`] and the drain continues.
    pub async fn process_tasks(&mut self) {
        while let Some(task) = self.tasks.pop() {
            let kind = task.kind();
            if let Err(error) = self.execute_task(task).await {
                tracing::error!(?kind, %error, "channel task failed");
                self.events.emit(ChannelEvent::TaskFailed {
                    kind,
                    error: error.to_string(),
                });
            }
        }
    }

    /// Publish a heartbeat carrying only clock, causal-history, and filter
    /// state. Runs directly (not queued) and never touches the outgoing
    /// buffer, local history, or filter. Returns whether a publisher was
    /// invoked.
    pub async fn send_sync_message(&mut self, publisher: Option<BoxPublisher>) -> Result<bool> {
        self.lamport_timestamp += 1;
        let message = Message::sync(
            self.channel_id.clone(),
            self.sender_id.clone(),
            self.lamport_timestamp,
            self.causal_history_window(),
            self.filter.to_bytes(),
        );

        let Some(mut publisher) = publisher else {
            return Ok(false);
        };
        publisher.publish(&message).await?;
        self.events.emit(ChannelEvent::SyncSent { message });
        Ok(true)
    }

    /// Re-examine buffered messages against the current local history.
    ///
    /// Messages whose dependencies are now met are delivered; messages
    /// past the retention timeout (when enabled) are dropped as
    /// irretrievably lost. Returns the dependencies still missing, deduped
    /// in first-seen order, so callers can use their retrieval hints
    /// against a store collaborator.
    pub fn sweep_incoming_buffer(&mut self) -> Vec<HistoryEntry> {
        let now = Instant::now();
        let mut missing: Vec<HistoryEntry> = Vec::new();
        let mut seen_missing: HashSet<MessageId> = HashSet::new();

        let buffered = std::mem::take(&mut self.incoming_buffer);
        let mut retained = Vec::with_capacity(buffered.len());
        for message in buffered {
            let unmet = self.missing_dependencies(&message.causal_history);
            if unmet.is_empty() {
                let message_id = message.message_id;
                self.deliver_message(&message, None);
                if let Some(repair) = &mut self.repair {
                    repair.mark_message_received(&message_id);
                }
                self.events.emit(ChannelEvent::MessageDelivered {
                    message_id,
                    origin: DeliveryOrigin::Received,
                });
                continue;
            }

            if self.config.received_message_timeout_enabled {
                if let Some(received_at) = self.time_received.get(&message.message_id) {
                    if now.duration_since(*received_at) > self.config.received_message_timeout {
                        // Lost: dropped without delivery and without
                        // reporting its dependencies.
                        tracing::warn!(
                            message_id = %message.message_id,
                            "dropping buffered message past receive timeout"
                        );
                        continue;
                    }
                }
            }

            for entry in unmet {
                if seen_missing.insert(entry.message_id) {
                    missing.push(entry);
                }
            }
            retained.push(message);
        }
        self.incoming_buffer = retained;

        self.queue_repair_requests(&missing);
        if !missing.is_empty() {
            self.events.emit(ChannelEvent::MissedMessages {
                entries: missing.clone(),
            });
        }
        missing
    }

    /// Partition the outgoing buffer by acknowledgement status. Pure: no
    /// state changes. Republish timing and policy stay with the caller.
    pub fn sweep_outgoing_buffer(&self) -> OutgoingBufferSweep {
        let mut sweep = OutgoingBufferSweep::default();
        for message in &self.outgoing_buffer {
            if self.acknowledgements.contains_key(&message.message_id) {
                sweep.possibly_acknowledged.push(message.clone());
            } else {
                sweep.unacknowledged.push(message.clone());
            }
        }
        sweep
    }

    /// Explicit GC: retain only the newest `max_entries` history records.
    /// This is the only non-append mutation of the local history.
    pub fn prune_local_history(&mut self, max_entries: usize) {
        let len = self.local_history.len();
        if len > max_entries {
            self.local_history.drain(..len - max_entries);
        }
    }

    // ── Repair layer passthroughs ──────────────────────────────────────

    /// Missing-message repair requests whose stagger delay has elapsed.
    /// Empty when the repair layer is disabled.
    pub fn repair_requests_due(&mut self, max: usize) -> Vec<HistoryEntry> {
        match &mut self.repair {
            Some(repair) => repair.requests_due(Instant::now(), max),
            None => Vec::new(),
        }
    }

    /// Record repair requests observed from other participants, queueing
    /// responses for messages we hold and are grouped to answer.
    pub fn process_repair_requests(&mut self, requests: &[HistoryEntry]) {
        let Some(repair) = &mut self.repair else {
            return;
        };
        let local_history = &self.local_history;
        let queued = repair.process_requests(requests, Instant::now(), |id| {
            local_history.iter().any(|r| r.entry.message_id == *id)
        });
        for message_id in queued {
            self.events
                .emit(ChannelEvent::RepairResponseQueued { message_id });
        }
    }

    /// Repair responses ready to transmit, resolved to full messages
    /// through the caller-supplied lookup (typically a store collaborator
    /// keyed by retrieval hint).
    pub fn repair_responses_due(
        &mut self,
        lookup: impl FnMut(&MessageId) -> Option<Message>,
    ) -> Vec<Message> {
        match &mut self.repair {
            Some(repair) => repair.responses_due(Instant::now(), lookup),
            None => Vec::new(),
        }
    }

    // ── Observability ──────────────────────────────────────────────────

    /// This channel's id.
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// The participant this channel sends as.
    pub fn sender_id(&self) -> &ParticipantId {
        &self.sender_id
    }

    /// Current Lamport clock value.
    pub fn lamport_timestamp(&self) -> u64 {
        self.lamport_timestamp
    }

    /// The local delivery log, ascending by `(timestamp, message_id)`.
    pub fn local_history(&self) -> &[LocalHistoryRecord] {
        &self.local_history
    }

    /// Sent-but-not-fully-acknowledged messages.
    pub fn outgoing_buffer(&self) -> &[Message] {
        &self.outgoing_buffer
    }

    /// Received messages whose dependencies are not yet met.
    pub fn incoming_buffer(&self) -> &[Message] {
        &self.incoming_buffer
    }

    /// Whether the local acknowledgement digest contains an id. Subject to
    /// the filter's false-positive rate.
    pub fn filter_contains(&self, message_id: &MessageId) -> bool {
        self.filter.lookup(message_id.as_bytes())
    }

    /// Queued-but-not-yet-drained operations.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// The active configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    // ── Task handlers ──────────────────────────────────────────────────

    async fn execute_task(&mut self, task: Task) -> Result<()> {
        match task {
            Task::Send { payload, publisher } => self.handle_send(payload, publisher).await,
            Task::Receive { message } => self.handle_receive(message),
            Task::SendEphemeral { payload, publisher } => {
                self.handle_send_ephemeral(payload, publisher).await
            }
        }
    }

    async fn handle_send(&mut self, payload: Bytes, publisher: Option<BoxPublisher>) -> Result<()> {
        self.lamport_timestamp += 1;
        let timestamp = self.lamport_timestamp;

        let message = Message::content(
            self.channel_id.clone(),
            self.sender_id.clone(),
            timestamp,
            self.causal_history_window(),
            self.filter.to_bytes(),
            payload,
        );
        let message_id = message.message_id;
        self.own_message_ids.insert(message_id);

        // Buffered means "submitted", independent of the transport
        // outcome; the commit below happens only on confirmed publish.
        self.outgoing_buffer.push(message.clone());

        let Some(mut publisher) = publisher else {
            return Ok(());
        };
        let outcome = publisher.publish(&message).await?;
        if outcome.success {
            self.filter.insert(message_id.as_bytes());
            self.insert_history_record(
                timestamp,
                HistoryEntry {
                    message_id,
                    retrieval_hint: outcome.retrieval_hint,
                    sender_id: Some(self.sender_id.clone()),
                },
            );
            self.time_received.insert(message_id, Instant::now());
            self.events.emit(ChannelEvent::MessageSent { message });
        }
        Ok(())
    }

    async fn handle_send_ephemeral(
        &mut self,
        payload: Bytes,
        publisher: Option<BoxPublisher>,
    ) -> Result<()> {
        let message = Message::ephemeral(self.channel_id.clone(), self.sender_id.clone(), payload);
        if let Some(mut publisher) = publisher {
            publisher.publish(&message).await?;
        }
        Ok(())
    }

    fn handle_receive(&mut self, message: Message) -> Result<()> {
        let message_id = message.message_id;

        // Sync messages all share the empty-content hash, so only content
        // messages participate in duplicate and echo suppression.
        if !message.content.is_empty() {
            if self.time_received.contains_key(&message_id) {
                tracing::debug!(%message_id, "dropping duplicate message");
                return Ok(());
            }
            if self
                .own_message_ids
                .contains(&MessageId::compute(&message.content))
            {
                tracing::debug!(%message_id, "dropping echo of own message");
                return Ok(());
            }
        }

        if message.lamport_timestamp.is_none() {
            // Ephemeral: delivered immediately, outside the causal order.
            self.deliver_message(&message, None);
            self.events.emit(ChannelEvent::EphemeralDelivered { message });
            return Ok(());
        }

        if message.content.is_empty() {
            self.events.emit(ChannelEvent::SyncReceived {
                message: message.clone(),
            });
        } else {
            self.events.emit(ChannelEvent::MessageReceived {
                message: message.clone(),
            });
        }

        self.review_ack_status(&message)?;

        if message.is_content() {
            self.filter.insert(message_id.as_bytes());
        }
        if let Some(repair) = &mut self.repair {
            repair.mark_message_received(&message_id);
        }

        let missing = self.missing_dependencies(&message.causal_history);
        if missing.is_empty() {
            self.deliver_message(&message, None);
            if message.is_content() {
                self.time_received.insert(message_id, Instant::now());
            }
            self.events.emit(ChannelEvent::MessageDelivered {
                message_id,
                origin: DeliveryOrigin::Received,
            });
        } else {
            self.time_received.insert(message_id, Instant::now());
            self.incoming_buffer.push(message);
            self.queue_repair_requests(&missing);
        }
        Ok(())
    }

    // ── Protocol internals ─────────────────────────────────────────────

    /// Fold a message into the local causal order.
    fn deliver_message(&mut self, message: &Message, retrieval_hint: Option<Bytes>) {
        let timestamp = message.lamport_timestamp.unwrap_or(0);
        if timestamp > self.lamport_timestamp {
            self.lamport_timestamp = timestamp;
        }

        // Sync and ephemeral messages never enter the local log.
        if message.content.is_empty() || message.lamport_timestamp.is_none() {
            return;
        }

        self.insert_history_record(
            timestamp,
            HistoryEntry {
                message_id: message.message_id,
                retrieval_hint,
                sender_id: Some(message.sender_id.clone()),
            },
        );
    }

    /// Insert preserving ascending `(timestamp, message_id)` order, the
    /// deterministic resolution for concurrent equal-timestamp deliveries.
    fn insert_history_record(&mut self, timestamp: u64, entry: HistoryEntry) {
        let idx = self.local_history.partition_point(|r| {
            (r.timestamp, &r.entry.message_id) <= (timestamp, &entry.message_id)
        });
        self.local_history
            .insert(idx, LocalHistoryRecord { timestamp, entry });
    }

    /// Update acknowledgement state of in-flight messages from a received
    /// message's causal history and bloom filter.
    fn review_ack_status(&mut self, received: &Message) -> Result<()> {
        // Everything a peer lists as causal history is known to it:
        // a full, transitive acknowledgement.
        for entry in &received.causal_history {
            let acked = entry.message_id;
            let before = self.outgoing_buffer.len();
            self.outgoing_buffer.retain(|m| m.message_id != acked);
            if self.outgoing_buffer.len() < before {
                self.events
                    .emit(ChannelEvent::MessageAcknowledged { message_id: acked });
            }
            self.acknowledgements.remove(&acked);
            if !self.filter.lookup(acked.as_bytes()) {
                self.filter.insert(acked.as_bytes());
            }
        }

        // A bloom sighting is only probabilistic: count distinct filters
        // reporting the message before treating it as acknowledged.
        let Some(snapshot) = &received.bloom_filter else {
            return Ok(());
        };
        let remote = BloomFilter::from_bytes(snapshot, self.config.bloom)?;

        let threshold = self.config.acknowledgement_count;
        let mut retained = Vec::with_capacity(self.outgoing_buffer.len());
        for message in self.outgoing_buffer.drain(..) {
            if !remote.lookup(message.message_id.as_bytes()) {
                retained.push(message);
                continue;
            }
            let count = self
                .acknowledgements
                .get(&message.message_id)
                .copied()
                .unwrap_or(0)
                + 1;
            if count < threshold {
                self.acknowledgements.insert(message.message_id, count);
                self.events.emit(ChannelEvent::PartialAcknowledgement {
                    message_id: message.message_id,
                    count,
                });
                retained.push(message);
            } else {
                self.acknowledgements.remove(&message.message_id);
            }
        }
        self.outgoing_buffer = retained;
        Ok(())
    }

    /// The last `causal_history_size` local-history entries, oldest first.
    fn causal_history_window(&self) -> Vec<HistoryEntry> {
        let start = self
            .local_history
            .len()
            .saturating_sub(self.config.causal_history_size);
        self.local_history[start..]
            .iter()
            .map(|r| r.entry.clone())
            .collect()
    }

    fn missing_dependencies(&self, causal_history: &[HistoryEntry]) -> Vec<HistoryEntry> {
        causal_history
            .iter()
            .filter(|entry| !self.history_contains(&entry.message_id))
            .cloned()
            .collect()
    }

    fn history_contains(&self, message_id: &MessageId) -> bool {
        self.local_history
            .iter()
            .any(|r| r.entry.message_id == *message_id)
    }

    fn queue_repair_requests(&mut self, missing: &[HistoryEntry]) {
        let Some(repair) = &mut self.repair else {
            return;
        };
        for message_id in repair.mark_dependencies_missing(missing, Instant::now()) {
            self.events
                .emit(ChannelEvent::RepairRequestQueued { message_id });
        }
    }
}
