//! # Causeway Bloom
//!
//! The probabilistic acknowledgement digest for Causeway channels.
//!
//! A [`BloomFilter`] is a fixed-size set summary with a tunable
//! false-positive rate and no false negatives. Channels embed a snapshot of
//! their filter in every content and sync message; receivers match their
//! in-flight messages against peer snapshots to accumulate probabilistic
//! acknowledgement without per-message handshakes.
//!
//! ## Usage
//!
//! ```rust
//! use causeway_bloom::{BloomFilter, BloomFilterOptions};
//!
//! let mut filter = BloomFilter::new(BloomFilterOptions::default()).unwrap();
//! filter.insert(b"message-id");
//! assert!(filter.lookup(b"message-id"));
//!
//! // Wire roundtrip: geometry is re-derived from options on the far side.
//! let snapshot = filter.to_bytes();
//! let remote = BloomFilter::from_bytes(&snapshot, *filter.options()).unwrap();
//! assert!(remote.lookup(b"message-id"));
//! ```

pub mod error;
pub mod filter;
pub mod params;

pub use error::{BloomError, Result};
pub use filter::{BloomFilter, BloomFilterOptions};
pub use params::{false_positive_rate, optimal_params, FilterParams};
