//! Content fingerprints and word-level drift measurement.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use vigil_core::FingerprintAlgorithm;

pub fn fingerprint(text: &str, algorithm: FingerprintAlgorithm) -> String {
    match algorithm {
        FingerprintAlgorithm::Sha256 => format!("{:x}", Sha256::digest(text.as_bytes())),
        FingerprintAlgorithm::Rolling => format!("{:016x}", rolling_hash(text)),
    }
}

/// Polynomial rolling hash (base 31) over the UTF-8 bytes.
fn rolling_hash(text: &str) -> u64 {
    text.bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64))
}

/// Share of words present on only one side: `|A △ B| / (|A| + |B|)` over the
/// lower-cased whitespace-separated word sets.
///
/// 0.0 when both sides are empty, 1.0 when exactly one is.
pub fn change_ratio(old: &str, new: &str) -> f64 {
    let old_words = word_set(old);
    let new_words = word_set(new);

    let total = old_words.len() + new_words.len();
    if total == 0 {
        return 0.0;
    }
    if old_words.is_empty() || new_words.is_empty() {
        return 1.0;
    }

    let differing = old_words.symmetric_difference(&new_words).count();
    differing as f64 / total as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}
