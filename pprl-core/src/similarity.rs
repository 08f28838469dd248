//! Similarity kernel (C6): Hamming distance on Bloom filters plus the
//! MinHash Jaccard estimate. No threshold is applied here — that is the
//! matcher's job.

use crate::bloom::BloomFilter;
use crate::error::CoreError;
use crate::minhash;

/// The two similarity scores between a pair of sketches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Hamming distance between the two Bloom filters.
    pub hamming: u32,
    /// Estimated Jaccard similarity between the two MinHash signatures.
    pub jaccard: f64,
}

/// Scores one sketch pair.
///
/// # Errors
/// Returns [`CoreError::BloomLengthMismatch`] or
/// [`CoreError::SignatureLengthMismatch`] when the two sketches have
/// differently-shaped Bloom filters or MinHash signatures, respectively.
pub fn score(
    left_bloom: &BloomFilter,
    left_sig: &[u32],
    right_bloom: &BloomFilter,
    right_sig: &[u32],
) -> Result<Similarity, CoreError> {
    let hamming = left_bloom.hamming(right_bloom)?;
    let jaccard = minhash::jaccard(left_sig, right_sig)?;
    Ok(Similarity { hamming, jaccard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sketches_score_zero_hamming_and_full_jaccard() {
        let mut bloom = BloomFilter::new(256, 4);
        bloom.add("al");
        let params = minhash::MinHashParams::derive("seed", 256, 16);
        let sig = params.signature(&bloom).unwrap();

        let similarity = score(&bloom, &sig, &bloom, &sig).unwrap();
        assert_eq!(similarity.hamming, 0);
        assert_eq!(similarity.jaccard, 1.0);
    }

    #[test]
    fn mismatched_bloom_lengths_are_rejected() {
        let left = BloomFilter::new(100, 4);
        let right = BloomFilter::new(200, 4);
        assert!(score(&left, &[], &right, &[]).is_err());
    }

    #[test]
    fn mismatched_signature_lengths_are_rejected() {
        let bloom = BloomFilter::new(100, 4);
        assert!(score(&bloom, &[1, 2], &bloom, &[1]).is_err());
    }
}
