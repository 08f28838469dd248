#![deny(missing_docs)]
//! The sketching, similarity, blocking and matching core of the
//! privacy-preserving record linkage engine.
//!
//! This crate has no knowledge of sockets, CLI flags, or file formats: it
//! consumes [`pprl_types::RawRecord`]s and configured field declarations and
//! produces [`tokenizer::Sketch`]es, scores and bands them, and assigns a
//! final match set. The two-party exchange that gets sketches from one
//! party to the other lives in `pprl-protocol`.

pub mod bloom;
pub mod blocking;
pub mod error;
pub mod matcher;
pub mod minhash;
pub mod normalize;
pub mod qgram;
pub mod similarity;
pub mod tokenizer;

pub use bloom::BloomFilter;
pub use blocking::LshParams;
pub use error::CoreError;
pub use matcher::{assign, is_match, MatchCandidate};
pub use minhash::{MinHashParams, P};
pub use similarity::{score, Similarity};
pub use tokenizer::{tokenize_batch, tokenize_record, Sketch, SketchParams};
