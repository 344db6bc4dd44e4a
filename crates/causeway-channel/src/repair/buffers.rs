//! Due-time-ordered buffers for the repair layer.
//!
//! Both buffers keep entries sorted ascending by due time and are
//! capacity-bounded: when full, the furthest-due entry is evicted so the
//! repairs that must happen soonest survive.

use causeway_core::{HistoryEntry, MessageId};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct OutgoingEntry {
    entry: HistoryEntry,
    due: Instant,
    /// Set once handed out; the entry stays buffered until the message
    /// actually arrives, but is not handed out again.
    requested: bool,
}

/// Missing messages we intend to request from the group.
#[derive(Debug)]
pub struct OutgoingRepairBuffer {
    items: Vec<OutgoingEntry>,
    max_size: usize,
}

impl OutgoingRepairBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::new(),
            max_size,
        }
    }

    /// Add a missing message with its request due time.
    ///
    /// Returns false when the id is already buffered; the original due
    /// time is kept in that case.
    pub fn add(&mut self, entry: HistoryEntry, due: Instant) -> bool {
        if self.contains(&entry.message_id) {
            return false;
        }
        if self.items.len() >= self.max_size {
            if let Some(evicted) = self.items.pop() {
                tracing::warn!(
                    message_id = %evicted.entry.message_id,
                    "repair buffer full, evicted furthest-due entry"
                );
            }
        }
        let idx = self.items.partition_point(|item| item.due <= due);
        self.items.insert(
            idx,
            OutgoingEntry {
                entry,
                due,
                requested: false,
            },
        );
        true
    }

    /// Remove a message (it arrived, or another participant is already
    /// requesting it).
    pub fn remove(&mut self, message_id: &MessageId) {
        self.items.retain(|item| item.entry.message_id != *message_id);
    }

    /// Entries whose due time has passed and which have not been handed
    /// out yet, up to `max`. Handed-out entries are marked requested and
    /// retained until [`remove`](Self::remove).
    pub fn eligible(&mut self, now: Instant, max: usize) -> Vec<HistoryEntry> {
        let mut due = Vec::new();
        for item in &mut self.items {
            if item.due > now || due.len() >= max {
                break;
            }
            if !item.requested {
                item.requested = true;
                due.push(item.entry.clone());
            }
        }
        due
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.items.iter().any(|item| item.entry.message_id == *message_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Earliest request due time, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.items.first().map(|item| item.due)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[derive(Debug, Clone)]
struct IncomingEntry {
    entry: HistoryEntry,
    due: Instant,
}

/// Repair requests from other participants that we may answer.
#[derive(Debug)]
pub struct IncomingRepairBuffer {
    items: Vec<IncomingEntry>,
    max_size: usize,
}

impl IncomingRepairBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::new(),
            max_size,
        }
    }

    /// Add a request with its response due time. Returns false when the id
    /// is already buffered.
    pub fn add(&mut self, entry: HistoryEntry, due: Instant) -> bool {
        if self.contains(&entry.message_id) {
            return false;
        }
        if self.items.len() >= self.max_size {
            if let Some(evicted) = self.items.pop() {
                tracing::warn!(
                    message_id = %evicted.entry.message_id,
                    "repair buffer full, evicted furthest-due entry"
                );
            }
        }
        let idx = self.items.partition_point(|item| item.due <= due);
        self.items.insert(idx, IncomingEntry { entry, due });
        true
    }

    /// Remove a request (the message was rebroadcast by someone else, or
    /// it arrived here).
    pub fn remove(&mut self, message_id: &MessageId) {
        self.items.retain(|item| item.entry.message_id != *message_id);
    }

    /// Drain and return all requests whose response due time has passed.
    pub fn ready(&mut self, now: Instant) -> Vec<HistoryEntry> {
        let cutoff = self.items.partition_point(|item| item.due <= now);
        self.items
            .drain(..cutoff)
            .map(|item| item.entry)
            .collect()
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.items.iter().any(|item| item.entry.message_id == *message_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Earliest response due time, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.items.first().map(|item| item.due)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
