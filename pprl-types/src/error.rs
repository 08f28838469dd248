//! Error kinds shared across the record-linkage workspace.
//!
//! Each variant here corresponds to one of the error kinds named in the
//! system design: a declared configuration is malformed, or a record
//! arriving from an external collaborator cannot be tokenized.

use thiserror::Error;

/// A declared run configuration is invalid.
///
/// Surfaced immediately at startup; never recovered from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A field declaration used a normalization method outside
    /// `name`/`date`/`gender`/`zip`/unspecified.
    #[error("unknown normalization method {method:?} for field {column:?}")]
    UnknownMethod {
        /// The offending column name.
        column: String,
        /// The unrecognized method prefix.
        method: String,
    },
    /// `lsh.b * lsh.r` did not equal `minhash.s`.
    #[error("lsh.b ({b}) * lsh.r ({r}) must equal minhash.s ({s})")]
    BandingMismatch {
        /// Configured number of bands.
        b: usize,
        /// Configured rows per band.
        r: usize,
        /// Configured signature length.
        s: usize,
    },
    /// `matching.hamming_threshold` exceeded `bloom.m`.
    #[error("hamming_threshold ({h}) must not exceed bloom length m ({m})")]
    HammingThresholdOutOfRange {
        /// The configured threshold.
        h: u32,
        /// The configured Bloom filter length.
        m: usize,
    },
    /// `matching.jaccard_threshold` fell outside `[0, 1]`.
    #[error("jaccard_threshold ({j}) must lie within [0, 1]")]
    JaccardThresholdOutOfRange {
        /// The offending threshold value.
        j: f64,
    },
    /// `database.random_bits_percent` fell outside `[0, 1)`.
    #[error("random_bits_percent ({r}) must lie within [0, 1)")]
    RandomBitsOutOfRange {
        /// The offending fraction.
        r: f64,
    },
    /// The declared field list was empty.
    #[error("database.fields must declare at least one field")]
    NoFields,
    /// A primary key column, or a duplicate field column, was misdeclared.
    #[error("duplicate field column {column:?}")]
    DuplicateField {
        /// The offending column name.
        column: String,
    },
}

/// A malformed input record was encountered while tokenizing.
///
/// The record is skipped; the run continues unless the skip rate exceeds
/// the configured cap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// The record had no (or an empty) primary-key `id` field.
    #[error("record is missing a non-empty `id` field")]
    MissingId,
    /// Two records within the same party declared the same `id`.
    #[error("duplicate id {id:?} within party")]
    DuplicateId {
        /// The duplicated identifier.
        id: String,
    },
    /// A declared field column was absent from the record.
    #[error("record {id:?} is missing declared column {column:?}")]
    MissingColumn {
        /// The record's id, if one could be read.
        id: String,
        /// The missing column name.
        column: String,
    },
}

/// The fraction of skipped input records exceeded the configured cap.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("skip rate {observed} exceeded configured cap {cap}")]
pub struct SkipRateExceeded {
    /// Observed fraction of skipped records.
    pub observed: f64,
    /// Configured maximum allowed fraction.
    pub cap: f64,
}
