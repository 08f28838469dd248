#![deny(missing_docs)]
//! The offline validation harness (C11): compares a produced match set
//! against a ground-truth pair set and reports precision, recall, and F1,
//! optionally with the full false-positive/false-negative pair lists.

use std::collections::BTreeSet;
use std::io::Write;

use serde::Serialize;
use thiserror::Error;

/// A single `(id_a, id_b)` match pair.
pub type Pair = (String, String);

/// Errors raised while writing a validation report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A record failed to serialize to CSV.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// A record failed to serialize to JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The underlying writer failed while flushing.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The computed validation metrics for one `(produced, ground_truth)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    /// True positives: pairs in both the produced and ground-truth sets.
    pub tp: usize,
    /// False positives: produced pairs absent from ground truth.
    pub fp: usize,
    /// False negatives: ground-truth pairs the run did not produce.
    #[serde(rename = "fn")]
    pub fn_: usize,
    /// `tp / (tp + fp)`, defined as `1.0` when the denominator is zero.
    pub precision: f64,
    /// `tp / (tp + fn_)`, defined as `1.0` when the denominator is zero.
    pub recall: f64,
    /// The harmonic mean of precision and recall; `0.0` when both are zero.
    pub f1: f64,
}

/// Compares a produced match set against ground truth and computes
/// precision, recall, and F1.
///
/// Duplicate pairs within either input are treated as a single pair (both
/// are sets, not multisets).
pub fn evaluate(produced: &[Pair], ground_truth: &[Pair]) -> Metrics {
    let produced: BTreeSet<_> = produced.iter().cloned().collect();
    let ground_truth: BTreeSet<_> = ground_truth.iter().cloned().collect();

    let tp = produced.intersection(&ground_truth).count();
    let fp = produced.difference(&ground_truth).count();
    let fn_ = ground_truth.difference(&produced).count();

    let precision = if tp + fp == 0 { 1.0 } else { tp as f64 / (tp + fp) as f64 };
    let recall = if tp + fn_ == 0 { 1.0 } else { tp as f64 / (tp + fn_) as f64 };
    let f1 = if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) };

    Metrics { tp, fp, fn_, precision, recall, f1 }
}

/// Returns the false-positive and false-negative pair lists, each
/// lexicographically sorted, for verbose reporting.
pub fn diff_pairs(produced: &[Pair], ground_truth: &[Pair]) -> (Vec<Pair>, Vec<Pair>) {
    let produced: BTreeSet<_> = produced.iter().cloned().collect();
    let ground_truth: BTreeSet<_> = ground_truth.iter().cloned().collect();
    let fp: Vec<_> = produced.difference(&ground_truth).cloned().collect();
    let fn_: Vec<_> = ground_truth.difference(&produced).cloned().collect();
    (fp, fn_)
}

#[derive(Serialize)]
struct MetricsRow {
    precision: f64,
    recall: f64,
    f1: f64,
    tp: usize,
    fp: usize,
    #[serde(rename = "fn")]
    fn_: usize,
}

#[derive(Serialize)]
struct PairRow<'a> {
    id_a: &'a str,
    id_b: &'a str,
}

/// Writes a validation report: a single `precision,recall,f1,tp,fp,fn` row,
/// and, when `verbose`, an `FP` section and an `FN` section each listing
/// their sorted pairs under an `id_a,id_b` header.
///
/// # Errors
/// Returns [`ReportError`] if the underlying writer fails.
pub fn write_report<W: Write>(
    writer: W,
    metrics: &Metrics,
    produced: &[Pair],
    ground_truth: &[Pair],
    verbose: bool,
) -> Result<(), ReportError> {
    let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    csv_writer.serialize(MetricsRow {
        precision: metrics.precision,
        recall: metrics.recall,
        f1: metrics.f1,
        tp: metrics.tp,
        fp: metrics.fp,
        fn_: metrics.fn_,
    })?;
    csv_writer.flush()?;

    if verbose {
        let (fp, fn_) = diff_pairs(produced, ground_truth);
        csv_writer.write_record(["FP"])?;
        csv_writer.write_record(["id_a", "id_b"])?;
        for (a, b) in &fp {
            csv_writer.serialize(PairRow { id_a: a, id_b: b })?;
        }
        csv_writer.write_record(["FN"])?;
        csv_writer.write_record(["id_a", "id_b"])?;
        for (a, b) in &fn_ {
            csv_writer.serialize(PairRow { id_a: a, id_b: b })?;
        }
        csv_writer.flush()?;
    }

    Ok(())
}

#[derive(Serialize)]
struct PairRowOwned {
    id_a: String,
    id_b: String,
}

impl From<Pair> for PairRowOwned {
    fn from((id_a, id_b): Pair) -> Self {
        Self { id_a, id_b }
    }
}

#[derive(Serialize)]
struct ReportJson<'a> {
    #[serde(flatten)]
    metrics: &'a Metrics,
    false_positives: Option<Vec<PairRowOwned>>,
    false_negatives: Option<Vec<PairRowOwned>>,
}

/// Writes the machine-readable sibling of [`write_report`]: the same
/// metrics, and, when `verbose`, the same false-positive/false-negative
/// pair lists, as a single JSON object instead of a CSV.
///
/// # Errors
/// Returns [`ReportError`] if the underlying writer fails.
pub fn write_report_json<W: Write>(
    writer: W,
    metrics: &Metrics,
    produced: &[Pair],
    ground_truth: &[Pair],
    verbose: bool,
) -> Result<(), ReportError> {
    let (false_positives, false_negatives) = if verbose {
        let (fp, fn_) = diff_pairs(produced, ground_truth);
        (
            Some(fp.into_iter().map(PairRowOwned::from).collect()),
            Some(fn_.into_iter().map(PairRowOwned::from).collect()),
        )
    } else {
        (None, None)
    };
    serde_json::to_writer_pretty(writer, &ReportJson { metrics, false_positives, false_negatives })?;
    Ok(())
}
