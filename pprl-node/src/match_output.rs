//! The match output artifact: CSV with header
//! `id_a,id_b,hamming,jaccard,is_match` in deterministic sorted order.

use std::io::Write;

use pprl_core::matcher::MatchCandidate;
use serde::Serialize;

#[derive(Serialize)]
struct Row<'a> {
    id_a: &'a str,
    id_b: &'a str,
    hamming: u32,
    jaccard: f64,
    is_match: bool,
}

/// Writes the assigned match set as CSV.
///
/// `candidates` is expected already sorted by `(id_a, id_b)` — the shape
/// [`pprl_core::matcher::assign`] returns — but this function does not
/// re-sort, so callers that skip assignment are responsible for ordering.
///
/// # Errors
/// Returns the underlying `csv::Error` on a write failure.
pub fn write_match_output<W: Write>(writer: W, candidates: &[MatchCandidate]) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for candidate in candidates {
        csv_writer.serialize(Row {
            id_a: &candidate.id_a,
            id_b: &candidate.id_b,
            hamming: candidate.hamming,
            jaccard: candidate.jaccard,
            is_match: candidate.is_match,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
