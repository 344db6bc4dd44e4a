//! Optimal filter geometry derivation.
//!
//! Formulas:
//! - m = -n*ln(fpr) / (ln(2)^2)  -- optimal bits
//! - k = (m/n) * ln(2)           -- optimal hash functions
//! - FPR = (1 - e^(-kn/m))^k     -- resulting false-positive rate

use std::f64::consts::LN_2;

/// Derived filter geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterParams {
    /// Number of bits in the filter (m).
    pub total_bits: usize,
    /// Number of hash functions (k).
    pub hashes: usize,
    /// Expected false-positive rate at full capacity.
    pub expected_fpr: f64,
}

/// Compute optimal geometry for an expected element count and target
/// false-positive rate.
///
/// Callers are expected to validate inputs; a zero capacity yields the
/// degenerate single-bit filter.
pub fn optimal_params(capacity: usize, error_rate: f64) -> FilterParams {
    if capacity == 0 {
        return FilterParams {
            total_bits: 1,
            hashes: 1,
            expected_fpr: 1.0,
        };
    }

    let n = capacity as f64;
    let ln2_squared = LN_2 * LN_2;

    let total_bits = (-n * error_rate.ln() / ln2_squared).ceil() as usize;
    let hashes = ((total_bits as f64 / n) * LN_2).round() as usize;
    let hashes = hashes.clamp(1, 32);

    FilterParams {
        total_bits,
        hashes,
        expected_fpr: false_positive_rate(total_bits, capacity, hashes),
    }
}

/// False-positive rate for m bits, n inserted elements, and k hashes.
pub fn false_positive_rate(total_bits: usize, inserted: usize, hashes: usize) -> f64 {
    if total_bits == 0 {
        return 1.0;
    }
    let exponent = -(hashes as f64) * (inserted as f64) / (total_bits as f64);
    (1.0 - exponent.exp()).powi(hashes as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        // capacity 10000 at 0.1% error lands on 10 hashes and
        // ~14.4 bits per element.
        let params = optimal_params(10_000, 0.001);
        assert_eq!(params.hashes, 10);
        assert!(params.total_bits >= 14 * 10_000 && params.total_bits <= 15 * 10_000);
        assert!(params.expected_fpr <= 0.001 * 1.1);
    }

    #[test]
    fn test_lower_error_rate_needs_more_bits() {
        let loose = optimal_params(1_000, 0.01);
        let tight = optimal_params(1_000, 0.001);
        assert!(tight.total_bits > loose.total_bits);
    }

    #[test]
    fn test_larger_capacity_needs_more_bits() {
        let small = optimal_params(100, 0.01);
        let large = optimal_params(10_000, 0.01);
        assert!(large.total_bits > small.total_bits);
    }

    #[test]
    fn test_hashes_clamped() {
        let params = optimal_params(10, 1e-12);
        assert!(params.hashes >= 1 && params.hashes <= 32);
    }

    #[test]
    fn test_zero_capacity_degenerates() {
        let params = optimal_params(0, 0.01);
        assert_eq!(params.total_bits, 1);
        assert_eq!(params.hashes, 1);
    }

    #[test]
    fn test_fpr_estimate_in_expected_band() {
        // m=1000, n=100, k=7 is the textbook ~0.8% case.
        let fpr = false_positive_rate(1_000, 100, 7);
        assert!(fpr > 0.005 && fpr < 0.02);
    }
}
