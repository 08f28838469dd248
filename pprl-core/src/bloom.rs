//! Fixed-size Bloom filter with Kirsch-Mitzenmacher double hashing and
//! optional per-record noise injection.

use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// A fixed-length bit array supporting probabilistic set membership via `k`
/// hash functions, plus optional random-bit noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bit_len: usize,
    k: u32,
    words: Vec<u64>,
}

impl BloomFilter {
    /// Creates an all-clear filter of `bit_len` bits using `k` hash probes
    /// per inserted element.
    pub fn new(bit_len: usize, k: u32) -> Self {
        let word_len = bit_len.div_ceil(64);
        Self {
            bit_len,
            k,
            words: vec![0; word_len],
        }
    }

    /// Number of addressable bits (`m`).
    pub fn size(&self) -> usize {
        self.bit_len
    }

    /// Configured number of hash probes (`k`).
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Number of set bits.
    pub fn popcount(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns the 0-based positions of every set bit.
    pub fn set_bits(&self) -> Vec<usize> {
        let mut bits = Vec::with_capacity(self.popcount());
        for (word_index, word) in self.words.iter().enumerate() {
            let mut word = *word;
            while word != 0 {
                let bit = word.trailing_zeros() as usize;
                bits.push(word_index * 64 + bit);
                word &= word - 1;
            }
        }
        bits
    }

    /// Inserts an element (typically a q-gram) using the mandatory
    /// double-hashing scheme: bit positions `(h1 + i*h2) mod m` for `i` in
    /// `[0, k)`, where `h1, h2` come from independent halves of a SHA-256
    /// digest of the element bytes.
    pub fn add(&mut self, element: &str) {
        let (h1, h2) = Self::hash_pair(element);
        let mut probe = h1;
        for _ in 0..self.k {
            let bit = (probe % self.bit_len as u64) as usize;
            self.set_bit(bit);
            probe = probe.wrapping_add(h2);
        }
    }

    /// Flips each currently-clear bit to set with independent probability
    /// `rate`, using a cryptographically strong RNG. Not reproducible and
    /// not meant to be: both parties add noise independently at the same
    /// expected rate.
    pub fn add_noise<R: Rng + CryptoRng>(&mut self, rate: f64, rng: &mut R) {
        if rate <= 0.0 {
            return;
        }
        for bit in 0..self.bit_len {
            if !self.is_bit_set(bit) && rng.r#gen::<f64>() < rate {
                self.set_bit(bit);
            }
        }
    }

    /// Hamming distance between two same-length filters.
    ///
    /// # Errors
    /// Returns [`CoreError::BloomLengthMismatch`] if `self.size() != other.size()`.
    pub fn hamming(&self, other: &Self) -> Result<u32, CoreError> {
        if self.bit_len != other.bit_len {
            return Err(CoreError::BloomLengthMismatch {
                left: self.bit_len,
                right: other.bit_len,
            });
        }
        let distance = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        Ok(distance)
    }

    /// Packs the filter into little-endian bit order within each byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let byte_len = self.bit_len.div_ceil(8);
        let mut bytes = vec![0u8; byte_len];
        for bit in self.set_bits() {
            bytes[bit / 8] |= 1 << (bit % 8);
        }
        bytes
    }

    /// Reconstructs a filter of `bit_len` bits from its packed byte
    /// representation.
    ///
    /// # Errors
    /// Returns [`CoreError::MalformedEncoding`] when `bytes.len()` does not
    /// match `ceil(bit_len / 8)`.
    pub fn from_bytes(bit_len: usize, k: u32, bytes: &[u8]) -> Result<Self, CoreError> {
        let expected = bit_len.div_ceil(8);
        if bytes.len() != expected {
            return Err(CoreError::MalformedEncoding {
                what: "bloom filter",
                expected,
                actual: bytes.len(),
            });
        }
        let mut filter = Self::new(bit_len, k);
        for bit in 0..bit_len {
            if bytes[bit / 8] & (1 << (bit % 8)) != 0 {
                filter.set_bit(bit);
            }
        }
        Ok(filter)
    }

    fn hash_pair(element: &str) -> (u64, u64) {
        let digest = Sha256::digest(element.as_bytes());
        let h1 = u64::from_be_bytes(digest[0..8].try_into().expect("8-byte slice"));
        let h2 = u64::from_be_bytes(digest[16..24].try_into().expect("8-byte slice")) | 1;
        (h1, h2)
    }

    fn set_bit(&mut self, bit: usize) {
        self.words[bit / 64] |= 1 << (bit % 64);
    }

    fn is_bit_set(&self, bit: usize) -> bool {
        self.words[bit / 64] & (1 << (bit % 64)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn every_hashed_bit_is_set_without_noise() {
        let mut filter = BloomFilter::new(1000, 5);
        filter.add("_m");
        filter.add("ma");
        filter.add("ar");
        assert!(filter.popcount() > 0);
        assert!(filter.popcount() <= 3 * 5);
    }

    #[test]
    fn hamming_identity_and_symmetry() {
        let mut a = BloomFilter::new(256, 4);
        a.add("al");
        let mut b = BloomFilter::new(256, 4);
        b.add("al");
        b.add("bo");

        assert_eq!(a.hamming(&a).unwrap(), 0);
        assert_eq!(a.hamming(&b).unwrap(), b.hamming(&a).unwrap());
        assert!(a.hamming(&b).unwrap() <= 256);
    }

    #[test]
    fn hamming_rejects_mismatched_lengths() {
        let a = BloomFilter::new(100, 3);
        let b = BloomFilter::new(200, 3);
        assert!(matches!(
            a.hamming(&b),
            Err(CoreError::BloomLengthMismatch { left: 100, right: 200 })
        ));
    }

    #[test]
    fn bytes_round_trip() {
        let mut filter = BloomFilter::new(137, 4);
        filter.add("_m");
        filter.add("l_");
        let bytes = filter.to_bytes();
        let restored = BloomFilter::from_bytes(137, 4, &bytes).unwrap();
        assert_eq!(filter, restored);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = BloomFilter::from_bytes(100, 3, &[0u8; 5]).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEncoding { expected: 13, actual: 5, .. }));
    }

    #[test]
    fn noise_only_adds_bits() {
        let mut filter = BloomFilter::new(2000, 5);
        filter.add("al");
        let before = filter.set_bits();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        filter.add_noise(0.05, &mut rng);
        let after: std::collections::HashSet<_> = filter.set_bits().into_iter().collect();
        assert!(before.iter().all(|bit| after.contains(bit)));
    }

    #[test]
    fn identical_inserts_yield_identical_filters() {
        let mut a = BloomFilter::new(500, 5);
        let mut b = BloomFilter::new(500, 5);
        for gram in ["_m", "ma", "ar", "ry", "y_"] {
            a.add(gram);
            b.add(gram);
        }
        assert_eq!(a, b);
    }
}
