//! The publish boundary.
//!
//! The channel never transmits bytes itself: each send operation carries a
//! [`Publisher`] supplied by the caller, and the channel only inspects the
//! reported [`PublishOutcome`]. Retry policy stays with the embedding
//! application (via [`sweep_outgoing_buffer`](crate::MessageChannel::sweep_outgoing_buffer)).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use causeway_core::Message;
use tokio::sync::Mutex;

use crate::error::{ChannelError, Result};

/// Outcome reported by the transport after attempting to publish.
#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    /// Whether the transport accepted the message.
    pub success: bool,
    /// Opaque handle peers can later use to retrieve this message from a
    /// store-style collaborator; attached to the local-history entry.
    pub retrieval_hint: Option<Bytes>,
}

impl PublishOutcome {
    /// A successful publish without a retrieval hint.
    pub fn delivered() -> Self {
        Self {
            success: true,
            retrieval_hint: None,
        }
    }

    /// A successful publish with a retrieval hint.
    pub fn delivered_with_hint(hint: Bytes) -> Self {
        Self {
            success: true,
            retrieval_hint: Some(hint),
        }
    }

    /// A clean failure (the message stays in the outgoing buffer).
    pub fn failed() -> Self {
        Self {
            success: false,
            retrieval_hint: None,
        }
    }
}

/// Transmits one message over the actual transport (relay, light-push, a
/// test harness). Supplied per send call and consumed by the queued task.
///
/// Returning `Err` fails the task; returning `success: false` is the clean
/// "transport declined" path and leaves retry to the caller.
#[async_trait]
pub trait Publisher: Send {
    /// Attempt to publish a message.
    async fn publish(&mut self, message: &Message) -> Result<PublishOutcome>;
}

/// Boxed publisher as stored on queued tasks.
pub type BoxPublisher = Box<dyn Publisher>;

/// An in-memory publisher for tests and examples.
///
/// Records every published message into a shared log and reports a
/// configured outcome. Tests shuttle the log into peer channels by hand,
/// standing in for the real transport fabric.
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    log: Arc<Mutex<Vec<Message>>>,
    success: bool,
    retrieval_hint: Option<Bytes>,
    error: Option<String>,
}

impl MemoryPublisher {
    /// A publisher that records and reports success.
    pub fn new() -> Self {
        Self::with_log(Arc::new(Mutex::new(Vec::new())))
    }

    /// A publisher recording into an existing log.
    pub fn with_log(log: Arc<Mutex<Vec<Message>>>) -> Self {
        Self {
            log,
            success: true,
            retrieval_hint: None,
            error: None,
        }
    }

    /// Report `success: false` for every publish.
    pub fn failing(mut self) -> Self {
        self.success = false;
        self
    }

    /// Fail the publish outright with a transport error.
    pub fn erroring(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Attach a retrieval hint to successful outcomes.
    pub fn with_retrieval_hint(mut self, hint: Bytes) -> Self {
        self.retrieval_hint = Some(hint);
        self
    }

    /// The shared log of published messages.
    pub fn log(&self) -> Arc<Mutex<Vec<Message>>> {
        self.log.clone()
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&mut self, message: &Message) -> Result<PublishOutcome> {
        if let Some(error) = &self.error {
            return Err(ChannelError::Transport(error.clone()));
        }
        self.log.lock().await.push(message.clone());
        Ok(PublishOutcome {
            success: self.success,
            retrieval_hint: self.retrieval_hint.clone(),
        })
    }
}
