//! Record tokenizer (C5): composes the normalizer, q-gram generator, Bloom
//! filter and MinHash sketch into a per-record `(id, bloom, minhash)`
//! sketch, and fans tokenization out across a bounded worker pool.
//!
//! Callers are expected to have already validated that every declared field
//! is present on the record (the ingestion boundary's job, not this
//! module's) — `tokenize_record` itself never fails.

use std::sync::Arc;

use pprl_types::{FieldSpec, RawRecord};
use rand::rngs::StdRng;
use rand::{CryptoRng, Rng, SeedableRng};

use crate::bloom::BloomFilter;
use crate::minhash::MinHashParams;
use crate::normalize::normalize;
use crate::qgram::qgrams;

/// The per-record sketch the two-party protocol exchanges.
#[derive(Debug, Clone, PartialEq)]
pub struct Sketch {
    /// Opaque id, unique within a party.
    pub id: String,
    /// Bloom filter built from every declared field's q-grams.
    pub bloom: BloomFilter,
    /// MinHash signature derived from the Bloom filter's set bits.
    pub minhash: Vec<u32>,
}

/// The sketch parameters a tokenization run needs: Bloom shape, noise rate,
/// and the shared MinHash permutation block.
#[derive(Debug, Clone)]
pub struct SketchParams {
    /// Bloom filter bit length (`m`).
    pub m: usize,
    /// Number of double-hash probes per q-gram (`k`).
    pub k: u32,
    /// Fraction of clear bits flipped to set, independently per record.
    pub random_bits_percent: f64,
    /// The shared MinHash permutation parameter block.
    pub minhash: MinHashParams,
}

/// Tokenizes one record: for each declared field, normalize the value,
/// q-gram it, and insert every q-gram into the record's Bloom filter; then
/// derive the MinHash signature and apply noise.
///
/// `record` must already contain every column named in `fields` — the
/// caller (the record ingestion boundary) is responsible for having
/// rejected records missing a declared column before they reach here.
pub fn tokenize_record<R: Rng + CryptoRng>(
    record: &RawRecord,
    fields: &[FieldSpec],
    params: &SketchParams,
    rng: &mut R,
) -> Sketch {
    let mut bloom = BloomFilter::new(params.m, params.k);
    for field in fields {
        let value = record.get(&field.column).unwrap_or_default();
        let normalized = normalize(value, field.method);
        for gram in qgrams(&normalized) {
            bloom.add(&gram);
        }
    }
    bloom.add_noise(params.random_bits_percent, rng);

    let minhash = params
        .minhash
        .signature(&bloom)
        .expect("bloom filter built to the configured m");

    Sketch {
        id: record.id().unwrap_or_default().to_string(),
        bloom,
        minhash,
    }
}

/// Tokenizes a batch of records across a bounded worker pool, preserving
/// the input order in the returned vector.
///
/// Per the concurrency design, the pool uses bounded channels with a
/// capacity of `4 * workers` between the record feed and the worker tasks,
/// and between the workers and the collector, so a slow consumer applies
/// backpressure instead of unbounded buffering.
pub async fn tokenize_batch(
    records: Vec<RawRecord>,
    fields: Arc<Vec<FieldSpec>>,
    params: Arc<SketchParams>,
    workers: usize,
) -> Vec<Sketch> {
    let workers = workers.max(1);
    let total = records.len();
    let capacity = workers * 4;

    let (work_tx, work_rx) = tokio::sync::mpsc::channel::<(usize, RawRecord)>(capacity);
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<(usize, Sketch)>(capacity);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let work_rx = work_rx.clone();
        let out_tx = out_tx.clone();
        let fields = fields.clone();
        let params = params.clone();
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            loop {
                let next = work_rx.lock().await.recv().await;
                let Some((index, record)) = next else {
                    break;
                };
                let sketch = tokenize_record(&record, &fields, &params, &mut rng);
                if out_tx.send((index, sketch)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(out_tx);

    let feeder = tokio::spawn(async move {
        for (index, record) in records.into_iter().enumerate() {
            if work_tx.send((index, record)).await.is_err() {
                break;
            }
        }
    });

    let mut collected: Vec<Option<Sketch>> = (0..total).map(|_| None).collect();
    while let Some((index, sketch)) = out_rx.recv().await {
        collected[index] = Some(sketch);
    }

    let _ = feeder.await;
    for handle in handles {
        let _ = handle.await;
    }

    collected
        .into_iter()
        .map(|sketch| sketch.expect("every submitted index is produced exactly once"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pprl_types::FieldMethod;
    use rand_chacha::ChaCha20Rng;

    fn params() -> SketchParams {
        SketchParams {
            m: 256,
            k: 4,
            random_bits_percent: 0.0,
            minhash: MinHashParams::derive("seed", 256, 16),
        }
    }

    fn record(id: &str, first: &str) -> RawRecord {
        let mut record = RawRecord::new();
        record.insert("id", id);
        record.insert("FIRST", first);
        record
    }

    #[test]
    fn identical_records_tokenize_identically_without_noise() {
        let fields = vec![FieldSpec::new("FIRST", FieldMethod::Name)];
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let a = tokenize_record(&record("a1", "Mary"), &fields, &params(), &mut rng);
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let b = tokenize_record(&record("b1", "Mary"), &fields, &params(), &mut rng);
        assert_eq!(a.bloom, b.bloom);
        assert_eq!(a.minhash, b.minhash);
    }

    #[test]
    fn id_is_carried_through() {
        let fields = vec![FieldSpec::new("FIRST", FieldMethod::Name)];
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let sketch = tokenize_record(&record("a1", "Mary"), &fields, &params(), &mut rng);
        assert_eq!(sketch.id, "a1");
    }

    #[tokio::test]
    async fn batch_tokenization_preserves_order() {
        let fields = Arc::new(vec![FieldSpec::new("FIRST", FieldMethod::Name)]);
        let records = vec![record("a1", "Mary"), record("a2", "Jane"), record("a3", "Sue")];
        let sketches = tokenize_batch(records, fields, Arc::new(params()), 3).await;
        assert_eq!(sketches.len(), 3);
        assert_eq!(sketches[0].id, "a1");
        assert_eq!(sketches[1].id, "a2");
        assert_eq!(sketches[2].id, "a3");
    }
}
