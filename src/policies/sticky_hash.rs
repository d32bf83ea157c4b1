//! Sticky assignment hashing
//!
//! A unit id is mapped to a reproducible value in [0, 1) by hashing
//! `"<experiment_id>:<unit_id>"` with SHA-256 and reading the first 15 hex digits
//! (60 bits) of the digest. The mapping depends on nothing but its inputs, so the
//! same unit lands in the same bucket across requests and process restarts for as
//! long as the weights stay the same.

use sha2::{Digest, Sha256};

const BUCKET_BITS: u32 = 60;
/// 16^15
const BUCKET_SPACE: f64 = (1u64 << BUCKET_BITS) as f64;

/// Deterministic bucket value in [0, 1) for a unit within an experiment.
pub fn bucket_value(experiment_id: &str, unit_id: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(experiment_id.as_bytes());
    hasher.update(b":");
    hasher.update(unit_id.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    // top 60 bits == first 15 hex digits
    let value = u64::from_be_bytes(prefix) >> (64 - BUCKET_BITS);
    value as f64 / BUCKET_SPACE
}

/// Index of the first entry whose cumulative weight is strictly greater than `r`.
///
/// Weights are taken in order and assumed normalized. When `r` is at or past the
/// last cumulative bound (1.0, or a sum that fell short through rounding), the last
/// entry is selected. Returns `None` only for an empty slice.
pub fn pick_bucket(weights: &[f64], r: f64) -> Option<usize> {
    let last = weights.len().checked_sub(1)?;
    let mut cumulative = 0.0;
    for (idx, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if cumulative > r {
            return Some(idx);
        }
    }
    Some(last)
}
