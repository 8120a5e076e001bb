//! Deterministic train/validation holdout keyed on record identifiers.

use market_core::PropertyRecord;
use sha2::{Digest, Sha256};

fn split_key(id: &str) -> String {
    hex::encode(Sha256::digest(id.as_bytes()))
}

/// Validation rows for `n` usable records: `ceil(n * ratio)`, at least one
/// and leaving at least one training row when `n >= 2`.
pub fn validation_size(n: usize, ratio: f64) -> usize {
    if n < 2 {
        return 0;
    }
    let wanted = (n as f64 * ratio).ceil() as usize;
    wanted.clamp(1, n - 1)
}

/// Split records by the SHA-256 of their id. The same id always lands on the
/// same side for a given input set, and the returned slices are in hash order
/// no matter how the input was ordered.
pub fn holdout<'a>(
    records: &[&'a PropertyRecord],
    ratio: f64,
) -> (Vec<&'a PropertyRecord>, Vec<&'a PropertyRecord>) {
    let mut keyed: Vec<(String, &'a PropertyRecord)> =
        records.iter().map(|r| (split_key(&r.id), *r)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

    let split_at = keyed.len() - validation_size(keyed.len(), ratio);
    let validation = keyed.split_off(split_at);
    (
        keyed.into_iter().map(|(_, r)| r).collect(),
        validation.into_iter().map(|(_, r)| r).collect(),
    )
}
