//! The record-iteration abstraction named in the external interfaces: "a
//! lazy, finite sequence of raw records, restartable if and only if the
//! backing source is." CSV/Postgres iteration is an external-collaborator
//! concern; this module ships the trait plus the two minimal concrete
//! sources needed to make the binary runnable end to end.

use std::path::Path;

use pprl_types::RawRecord;
use thiserror::Error;

/// Errors raised while ingesting a raw input record.
///
/// These are local to the record-source boundary: a malformed record is
/// skipped by the caller (see [`super::run`]), not propagated as fatal.
#[derive(Debug, Error)]
pub enum DataError {
    /// The record had no (or an empty) primary-key `id` field.
    #[error("record is missing a non-empty `id` field")]
    MissingId,
    /// Two records within the same source declared the same `id`.
    #[error("duplicate id {id:?} within source")]
    DuplicateId {
        /// The duplicated identifier.
        id: String,
    },
    /// Reading the backing CSV file failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// A lazy, finite sequence of raw input records.
///
/// Mirrors the external interface's `next() -> Option<RawRecord>` contract,
/// generalized to report a per-record error instead of panicking on a
/// malformed row.
pub trait RecordSource {
    /// The error a malformed record or backing-store failure raises.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the next record, or `None` once the source is exhausted.
    fn next(&mut self) -> impl Future<Output = Option<Result<RawRecord, Self::Error>>> + Send;
}

/// An in-memory record source: used by tests and the validation harness,
/// which already hold their records as a `Vec`.
pub struct VecRecordSource {
    records: std::vec::IntoIter<RawRecord>,
}

impl VecRecordSource {
    /// Wraps an already-materialized record vector.
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records: records.into_iter() }
    }
}

impl RecordSource for VecRecordSource {
    type Error = DataError;

    async fn next(&mut self) -> Option<Result<RawRecord, Self::Error>> {
        self.records.next().map(Ok)
    }
}

/// A `csv`-crate-backed record source: the binary's real-file entry point.
///
/// Performs no schema inference or type coercion: the CSV header row names
/// the columns, and every other row is read as a `RawRecord` of string
/// values exactly as written.
pub struct CsvRecordSource {
    records: csv::StringRecordsIntoIter<std::fs::File>,
    headers: csv::StringRecord,
}

impl CsvRecordSource {
    /// Opens `path` and reads its header row.
    ///
    /// # Errors
    /// Returns [`DataError::Csv`] if the file cannot be opened or its
    /// header row cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        Ok(Self { records: reader.into_records(), headers })
    }
}

impl RecordSource for CsvRecordSource {
    type Error = DataError;

    async fn next(&mut self) -> Option<Result<RawRecord, Self::Error>> {
        let row = match self.records.next()? {
            Ok(row) => row,
            Err(err) => return Some(Err(DataError::Csv(err))),
        };
        let record: RawRecord = self
            .headers
            .iter()
            .zip(row.iter())
            .map(|(column, value)| (column.to_string(), value.to_string()))
            .collect();
        if record.id().is_none() {
            return Some(Err(DataError::MissingId));
        }
        Some(Ok(record))
    }
}

/// Drains `source` into a `Vec`, skipping records that raise a recoverable
/// `DataError` and returning the count skipped (the run-level skip-rate cap
/// from `RunConfig::skip_rate_cap` is enforced by the caller against this
/// count).
///
/// # Errors
/// Returns [`DataError::DuplicateId`] the first time a record repeats an
/// `id` already seen from this source: a duplicate id within a party is a
/// structurally broken input, not a single bad row, and must abort ingestion
/// rather than silently drop one of the two records. Every other per-record
/// error (missing id, malformed row) is logged and skipped.
pub async fn drain<S: RecordSource>(mut source: S) -> Result<(Vec<RawRecord>, usize), DataError> {
    let mut records = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();
    let mut skipped = 0usize;

    while let Some(result) = source.next().await {
        match result {
            Ok(record) => match record.id() {
                Some(id) if seen_ids.insert(id.to_string()) => records.push(record),
                Some(id) => {
                    let id = id.to_string();
                    tracing::error!(category = "DataError", id, "duplicate id within source, aborting");
                    return Err(DataError::DuplicateId { id });
                }
                None => {
                    tracing::warn!(category = "DataError", "record missing id, skipping");
                    skipped += 1;
                }
            },
            Err(err) => {
                tracing::warn!(category = "DataError", error = %err, "skipping malformed record");
                skipped += 1;
            }
        }
    }

    Ok((records, skipped))
}
