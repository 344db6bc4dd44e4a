//! Error types for the bloom filter.

use thiserror::Error;

/// Errors that can occur constructing or deserializing a filter.
#[derive(Debug, Error)]
pub enum BloomError {
    /// Capacity must be at least one element.
    #[error("invalid capacity: {0}")]
    InvalidCapacity(usize),

    /// Error rate must lie strictly between 0 and 1.
    #[error("invalid error rate: {0}")]
    InvalidErrorRate(f64),

    /// Serialized bytes do not match the geometry the options imply.
    #[error("serialized filter length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Result type for bloom filter operations.
pub type Result<T> = std::result::Result<T, BloomError>;
