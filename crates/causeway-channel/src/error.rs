//! Error types for the channel module.
//!
//! Expected protocol conditions (duplicate receipt, unmet dependencies,
//! bloom false positives, timeout loss) are state transitions, not errors;
//! only collaborator failures surface here.

use thiserror::Error;

/// Errors that can occur while executing channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The publish collaborator failed outright (distinct from a clean
    /// `success: false` outcome, which is not an error).
    #[error("transport error: {0}")]
    Transport(String),

    /// A peer's bloom filter snapshot could not be reconstructed.
    #[error("bloom filter error: {0}")]
    Bloom(#[from] causeway_bloom::BloomError),
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
