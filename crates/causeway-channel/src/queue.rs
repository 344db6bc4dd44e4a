//! The task queue.
//!
//! Every mutating channel operation is appended here as a tagged operation
//! and drained one at a time by
//! [`process_tasks`](crate::MessageChannel::process_tasks), which the
//! embedding application invokes; there is no internal timer. Each task is
//! fully awaited before the next is popped, so concurrent send/receive
//! calls cannot race on channel state: this is cooperative single-threaded
//! scheduling, not locking.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use causeway_core::Message;

use crate::publish::BoxPublisher;

/// Discriminates queued operation kinds, for logging and failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// A causal, acknowledged send.
    Send,
    /// Processing of an inbound message.
    Receive,
    /// A fire-and-forget send.
    SendEphemeral,
}

/// A queued mutating operation with its parameters.
pub(crate) enum Task {
    Send {
        payload: Bytes,
        publisher: Option<BoxPublisher>,
    },
    Receive {
        message: Message,
    },
    SendEphemeral {
        payload: Bytes,
        publisher: Option<BoxPublisher>,
    },
}

impl Task {
    pub(crate) fn kind(&self) -> TaskKind {
        match self {
            Task::Send { .. } => TaskKind::Send,
            Task::Receive { .. } => TaskKind::Receive,
            Task::SendEphemeral { .. } => TaskKind::SendEphemeral,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task::{:?}", self.kind())
    }
}

/// FIFO of pending operations.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub(crate) fn enqueue(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub(crate) fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
