//! MinHash-LSH banding: cuts the full N·M cross-join down to a candidate
//! set by grouping signatures that share at least one band key.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;

/// LSH banding shape: `b` bands of `r` rows each, with `b * r` equal to the
/// MinHash signature length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    /// Number of bands.
    pub b: usize,
    /// Rows (signature entries) per band.
    pub r: usize,
    /// Maximum ids returned from a single over-full band bucket.
    pub max_bucket_fanout: usize,
}

impl LshParams {
    /// Validates `b * r == s` and builds the banding shape.
    ///
    /// # Errors
    /// Returns [`CoreError::BandingMismatch`] when the shape does not evenly
    /// divide the signature length.
    pub fn new(b: usize, r: usize, s: usize, max_bucket_fanout: usize) -> Result<Self, CoreError> {
        if b * r != s {
            return Err(CoreError::BandingMismatch { b, r, s });
        }
        Ok(Self { b, r, max_bucket_fanout })
    }

    fn band_key(&self, signature: &[u32], band: usize) -> Vec<u8> {
        let start = band * self.r;
        let mut key = Vec::with_capacity(self.r * 4);
        for entry in &signature[start..start + self.r] {
            key.extend_from_slice(&entry.to_le_bytes());
        }
        key
    }

    /// Builds one band's bucket map over `signatures`, indexed by position.
    ///
    /// A bucket that would exceed `max_bucket_fanout` stops accepting new
    /// members; already-full buckets (an all-empty-Bloom collision, most
    /// commonly) are the intended target of the cap.
    fn bucket_map(&self, signatures: &[&[u32]], band: usize) -> HashMap<Vec<u8>, Vec<usize>> {
        let mut map: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
        for (index, signature) in signatures.iter().enumerate() {
            let key = self.band_key(signature, band);
            let bucket = map.entry(key).or_default();
            if bucket.len() < self.max_bucket_fanout {
                bucket.push(index);
            }
        }
        map
    }

    /// Returns the set of `(left_index, right_index)` candidate pairs: those
    /// sharing at least one band key across the two signature sets. A pair
    /// appearing in multiple bands appears once.
    ///
    /// Both sides' buckets are capped at `max_bucket_fanout` independently,
    /// so an over-full bucket on either side (an all-empty-Bloom collision,
    /// most commonly) bounds the candidate cross-product it can produce
    /// instead of scaling with the uncapped side's membership.
    pub fn candidate_pairs(
        &self,
        left: &[&[u32]],
        right: &[&[u32]],
    ) -> HashSet<(usize, usize)> {
        let mut candidates = HashSet::new();
        for band in 0..self.b {
            let left_buckets = self.bucket_map(left, band);
            let right_buckets = self.bucket_map(right, band);
            for (key, left_indices) in &left_buckets {
                let Some(right_indices) = right_buckets.get(key) else {
                    continue;
                };
                for &left_index in left_indices {
                    for &right_index in right_indices {
                        candidates.insert((left_index, right_index));
                    }
                }
            }
        }
        candidates
    }
}
