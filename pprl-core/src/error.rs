//! Error kinds raised by the sketching, similarity and blocking/matching
//! stages. These are local to one party: they never carry cross-party state
//! and do not know about sockets or protocol framing (see `pprl-protocol`
//! for the errors that do).

/// Errors raised while constructing or comparing sketches.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Two Bloom filters (or a Bloom filter operation) saw mismatched bit
    /// lengths.
    #[error("bloom filters have mismatched bit length: {left} != {right}")]
    BloomLengthMismatch {
        /// Bit length of the left-hand operand.
        left: usize,
        /// Bit length of the right-hand operand.
        right: usize,
    },
    /// Two MinHash signatures (or a similarity operation) saw mismatched
    /// signature lengths.
    #[error("minhash signatures have mismatched length: {left} != {right}")]
    SignatureLengthMismatch {
        /// Length of the left-hand operand.
        left: usize,
        /// Length of the right-hand operand.
        right: usize,
    },
    /// A byte blob handed to a decoder did not have the expected length.
    #[error("malformed {what}: expected {expected} bytes, got {actual}")]
    MalformedEncoding {
        /// What was being decoded, e.g. "bloom filter".
        what: &'static str,
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
    /// LSH banding parameters do not evenly divide the signature length.
    #[error("lsh banding mismatch: b={b} * r={r} != s={s}")]
    BandingMismatch {
        /// Number of bands.
        b: usize,
        /// Rows per band.
        r: usize,
        /// Signature length.
        s: usize,
    },
}
