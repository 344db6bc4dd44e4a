//! The bloom filter.
//!
//! A constant-size probabilistic set with a tunable false-positive rate.
//! Inserted elements are never reported absent; absent elements are
//! reported present at approximately the configured rate. Embedded in
//! outgoing and sync messages as a compact "messages I hold" digest, so
//! peers can infer acknowledgement without per-message handshakes.

use std::io::Cursor;

use bitvec::prelude::*;
use bytes::Bytes;

use crate::error::{BloomError, Result};
use crate::params::optimal_params;

/// Filter sizing options.
///
/// Both sides of a channel must agree on these: the serialized form
/// carries only the bit array, and geometry is re-derived from options at
/// deserialization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomFilterOptions {
    /// Expected number of inserted elements.
    pub capacity: usize,
    /// Target false-positive rate at full capacity.
    pub error_rate: f64,
}

impl Default for BloomFilterOptions {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            error_rate: 0.001,
        }
    }
}

impl BloomFilterOptions {
    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(BloomError::InvalidCapacity(self.capacity));
        }
        if !(self.error_rate > 0.0 && self.error_rate < 1.0) {
            return Err(BloomError::InvalidErrorRate(self.error_rate));
        }
        Ok(())
    }
}

/// Bloom filter over arbitrary byte strings.
#[derive(Clone, Debug)]
pub struct BloomFilter {
    bits: BitVec<u8, Lsb0>,
    total_bits: usize,
    hashes: usize,
    options: BloomFilterOptions,
}

impl BloomFilter {
    /// Create an empty filter with geometry derived from the options.
    pub fn new(options: BloomFilterOptions) -> Result<Self> {
        options.validate()?;
        let params = optimal_params(options.capacity, options.error_rate);
        Ok(Self {
            bits: bitvec![u8, Lsb0; 0; params.total_bits],
            total_bits: params.total_bits,
            hashes: params.hashes,
            options,
        })
    }

    /// Insert an element. After insertion, [`lookup`](Self::lookup) for the
    /// same element is guaranteed to return true.
    pub fn insert(&mut self, element: &[u8]) {
        for pos in hash_positions(element, self.hashes, self.total_bits) {
            self.bits.set(pos, true);
        }
    }

    /// Test membership. False negatives never occur; false positives occur
    /// at approximately the configured error rate.
    pub fn lookup(&self, element: &[u8]) -> bool {
        hash_positions(element, self.hashes, self.total_bits)
            .iter()
            .all(|&pos| self.bits[pos])
    }

    /// Snapshot the bit array for embedding in a message.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.bits.as_raw_slice())
    }

    /// Reconstruct a filter from a snapshot produced by a peer with the
    /// same options.
    pub fn from_bytes(bytes: &[u8], options: BloomFilterOptions) -> Result<Self> {
        options.validate()?;
        let params = optimal_params(options.capacity, options.error_rate);
        let expected = (params.total_bits + 7) / 8;
        if bytes.len() != expected {
            return Err(BloomError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let mut bits = BitVec::<u8, Lsb0>::from_slice(bytes);
        bits.truncate(params.total_bits);
        Ok(Self {
            bits,
            total_bits: params.total_bits,
            hashes: params.hashes,
            options,
        })
    }

    /// The configured options.
    pub fn options(&self) -> &BloomFilterOptions {
        &self.options
    }

    /// Filter size in bits (m).
    pub fn total_bits(&self) -> usize {
        self.total_bits
    }

    /// Number of hash functions (k).
    pub fn hashes(&self) -> usize {
        self.hashes
    }
}

/// Bit positions for an element via double hashing: h(i) = h1 + i*h2.
fn hash_positions(element: &[u8], hashes: usize, total_bits: usize) -> Vec<usize> {
    let h1 = murmur(element, 0);
    let h2 = murmur(element, 1);
    let m = total_bits as u64;
    (0..hashes as u64)
        .map(|i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
        .collect()
}

/// MurmurHash3 x64 128-bit digest, lower 64 bits.
fn murmur(element: &[u8], seed: u32) -> u64 {
    let mut cursor = Cursor::new(element);
    murmur3::murmur3_x64_128(&mut cursor, seed).unwrap_or(0) as u64
}
