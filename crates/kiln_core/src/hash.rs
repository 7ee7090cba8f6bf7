//! Key hashing helpers.

use std::hash::{Hash, Hasher};

/// Compute a `u64` hash of any `Hash`-able value using `FxHasher`.
///
/// Used for cheap cache fingerprints (layout descriptions, pipeline keys).
/// Not stable across builds; never persist the result.
#[inline]
pub fn fx_hash_key<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}
