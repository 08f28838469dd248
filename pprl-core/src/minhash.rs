//! Deterministic s-permutation MinHash over a Bloom filter's set bits.
//!
//! The permutation family `(a, b, P)` must be byte-identical on both
//! parties, so it is derived once from a seed string and the `(m, s)` shape
//! and then threaded through as a plain value — no process-wide state.

use crate::bloom::BloomFilter;
use crate::error::CoreError;

/// The shared Mersenne prime modulus, `2^31 - 1`.
pub const P: u64 = 2_147_483_647;

/// The `(a, b, P, m, s)` permutation parameter block shared by both parties.
///
/// Constructed once from a seed string; everything downstream (tokenizer,
/// matcher) takes this by reference and never regenerates it mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHashParams {
    m: usize,
    s: usize,
    a: Vec<u64>,
    b: Vec<u64>,
}

impl MinHashParams {
    /// Derives the parameter block from a seed string and the configured
    /// `(m, s)` shape.
    ///
    /// Deterministic and language-independent: the seed is hashed with
    /// SHA-256 into a 64-bit state, then a splitmix64 stream draws
    /// `a[i] in [1, P-1]` and `b[i] in [0, P-1]` for `i in [0, s)`.
    pub fn derive(seed: &str, m: usize, s: usize) -> Self {
        use sha2::{Digest, Sha256};

        let digest = Sha256::digest(seed.as_bytes());
        let mut state = u64::from_be_bytes(digest[0..8].try_into().expect("8-byte slice"));

        let mut a = Vec::with_capacity(s);
        let mut b = Vec::with_capacity(s);
        for _ in 0..s {
            state = splitmix64_next(state);
            a.push(1 + (splitmix64_output(state) % (P - 1)));
            state = splitmix64_next(state);
            b.push(splitmix64_output(state) % P);
        }

        Self { m, s, a, b }
    }

    /// Signature width (`s`).
    pub fn s(&self) -> usize {
        self.s
    }

    /// Expected Bloom filter bit length (`m`).
    pub fn m(&self) -> usize {
        self.m
    }

    /// The `a` multipliers, `a[i] in [1, P-1]`.
    pub fn a(&self) -> &[u64] {
        &self.a
    }

    /// The `b` additive terms, `b[i] in [0, P-1]`.
    pub fn b(&self) -> &[u64] {
        &self.b
    }

    /// Computes the MinHash signature of `bloom` under this parameter
    /// block.
    ///
    /// `sig[i] = min over j in set_bits(bloom) of (a[i]*j + b[i]) mod P`.
    /// If `bloom` has no set bits, every entry is `P`.
    ///
    /// # Errors
    /// Returns [`CoreError::BloomLengthMismatch`] if `bloom.size() != self.m()`.
    pub fn signature(&self, bloom: &BloomFilter) -> Result<Vec<u32>, CoreError> {
        if bloom.size() != self.m {
            return Err(CoreError::BloomLengthMismatch {
                left: self.m,
                right: bloom.size(),
            });
        }

        let set_bits = bloom.set_bits();
        let mut sig = Vec::with_capacity(self.s);
        for (&a_i, &b_i) in self.a.iter().zip(&self.b) {
            let mut min = P;
            for &j in &set_bits {
                let value = (a_i * j as u64 + b_i) % P;
                if value < min {
                    min = value;
                }
            }
            sig.push(min as u32);
        }
        Ok(sig)
    }
}

fn splitmix64_next(state: u64) -> u64 {
    state.wrapping_add(0x9E37_79B9_7F4A_7C15)
}

fn splitmix64_output(state: u64) -> u64 {
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Estimates Jaccard similarity from two equal-length MinHash signatures:
/// the fraction of positions at which they agree.
///
/// # Errors
/// Returns [`CoreError::SignatureLengthMismatch`] if the signatures differ
/// in length.
pub fn jaccard(left: &[u32], right: &[u32]) -> Result<f64, CoreError> {
    if left.len() != right.len() {
        return Err(CoreError::SignatureLengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    if left.is_empty() {
        return Ok(1.0);
    }
    let matches = left.iter().zip(right.iter()).filter(|(l, r)| l == r).count();
    Ok(matches as f64 / left.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let first = MinHashParams::derive("seed", 1000, 128);
        let second = MinHashParams::derive("seed", 1000, 128);
        assert_eq!(first, second);
    }

    #[test]
    fn different_seeds_diverge() {
        let first = MinHashParams::derive("seed-a", 1000, 128);
        let second = MinHashParams::derive("seed-b", 1000, 128);
        assert_ne!(first.a(), second.a());
    }

    #[test]
    fn coefficients_are_in_range() {
        let params = MinHashParams::derive("seed", 1000, 128);
        for &a in params.a() {
            assert!((1..P).contains(&a));
        }
        for &b in params.b() {
            assert!(b < P);
        }
    }

    #[test]
    fn empty_bloom_filter_yields_all_p_signature() {
        let params = MinHashParams::derive("seed", 256, 16);
        let bloom = BloomFilter::new(256, 4);
        let sig = params.signature(&bloom).unwrap();
        assert!(sig.iter().all(|&v| v as u64 == P));
    }

    #[test]
    fn signature_entries_are_in_range() {
        let params = MinHashParams::derive("seed", 256, 16);
        let mut bloom = BloomFilter::new(256, 4);
        bloom.add("_m");
        bloom.add("ma");
        let sig = params.signature(&bloom).unwrap();
        assert!(sig.iter().all(|&v| (v as u64) <= P));
    }

    #[test]
    fn identical_bloom_filters_produce_identical_signatures() {
        let params = MinHashParams::derive("seed", 256, 16);
        let mut a = BloomFilter::new(256, 4);
        let mut b = BloomFilter::new(256, 4);
        for gram in ["_m", "ma", "ar", "ry"] {
            a.add(gram);
            b.add(gram);
        }
        assert_eq!(params.signature(&a).unwrap(), params.signature(&b).unwrap());
    }

    #[test]
    fn signature_rejects_mismatched_bloom_size() {
        let params = MinHashParams::derive("seed", 256, 16);
        let bloom = BloomFilter::new(128, 4);
        assert!(params.signature(&bloom).is_err());
    }

    #[test]
    fn jaccard_bounds_and_identity() {
        let params = MinHashParams::derive("seed", 256, 32);
        let mut bloom = BloomFilter::new(256, 4);
        bloom.add("al");
        let sig = params.signature(&bloom).unwrap();
        assert_eq!(jaccard(&sig, &sig).unwrap(), 1.0);

        let other = BloomFilter::new(256, 4);
        let other_sig = params.signature(&other).unwrap();
        let estimate = jaccard(&sig, &other_sig).unwrap();
        assert!((0.0..=1.0).contains(&estimate));
    }

    #[test]
    fn jaccard_rejects_mismatched_lengths() {
        assert!(jaccard(&[1, 2, 3], &[1, 2]).is_err());
    }
}
