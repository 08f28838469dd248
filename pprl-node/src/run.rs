//! Orchestration: wires a validated configuration and a peer connection
//! through tokenize → exchange → match → report, exactly the pipeline
//! named in the external interfaces.

use std::sync::Arc;

use pprl_core::blocking::LshParams;
use pprl_core::matcher::{self, MatchCandidate};
use pprl_core::minhash::MinHashParams;
use pprl_core::similarity;
use pprl_core::tokenizer::{tokenize_batch, Sketch, SketchParams};
use pprl_protocol::session::{Session, VerifyOutcome};
use pprl_types::config::RunConfig;
use pprl_types::{FieldSpec, RawRecord};

/// Everything produced by one run, beyond the match CSV already written to
/// disk: kept around so the binary can additionally run the validation
/// harness against a ground-truth file without re-deriving anything.
pub struct RunOutcome {
    /// The final assigned match set, sorted by `(id_a, id_b)`.
    pub matches: Vec<MatchCandidate>,
    /// Whether both parties' `VERIFY` digests agreed.
    pub verified: bool,
}

/// Tokenizes `own_records` under `config`, runs the full two-party exchange
/// over `session`, and returns the locally-assigned match set.
///
/// # Errors
/// Propagates the session's [`pprl_protocol::ProtocolError`] (version or
/// parameter mismatch, frame or timeout failure) and [`pprl_core::CoreError`]
/// (mismatched sketch shapes, which a correct parameter fingerprint should
/// already have ruled out).
pub async fn run(
    config: &RunConfig,
    fields: &[FieldSpec],
    own_records: Vec<RawRecord>,
    session: &mut Session,
) -> eyre::Result<RunOutcome> {
    let minhash = MinHashParams::derive(&config.minhash.seed, config.minhash.m, config.minhash.s);
    let sketch_params = Arc::new(SketchParams {
        m: config.minhash.m,
        k: config.bloom.k,
        random_bits_percent: config.database.random_bits_percent,
        minhash,
    });
    let fields_arc = Arc::new(fields.to_vec());

    tracing::info!(count = own_records.len(), "tokenizing records");
    let own_sketches = tokenize_batch(own_records, fields_arc, sketch_params, config.batch_size.max(1)).await;

    tracing::info!(count = own_sketches.len(), "exchanging sketches with peer");
    let peer_sketches = session.exchange_sketches(own_sketches.clone(), config.bloom.k).await?;
    tracing::info!(count = peer_sketches.len(), "received peer sketches");

    let candidates = score_candidates(config, &own_sketches, &peer_sketches)?;
    let matches = matcher::assign(candidates, config.matching.allow_duplicates, config.minhash.m);

    let pairs: Vec<(String, String)> = matches.iter().map(|c| (c.id_a.clone(), c.id_b.clone())).collect();
    let outcome = session.verify(&pairs).await?;
    let verified = match outcome {
        VerifyOutcome::Agreed => true,
        VerifyOutcome::Disagreed { peer_pairs } => {
            tracing::error!(
                ours = pairs.len(),
                theirs = peer_pairs.len(),
                "VERIFY digests disagreed; match sets are inconsistent"
            );
            false
        }
    };

    Ok(RunOutcome { matches, verified })
}

/// Runs C7 (blocking) and C6 (similarity scoring) over the two sketch sets,
/// evaluating the conjunctive match predicate for every surviving
/// candidate pair.
fn score_candidates(
    config: &RunConfig,
    own_sketches: &[Sketch],
    peer_sketches: &[Sketch],
) -> eyre::Result<Vec<MatchCandidate>> {
    let lsh = LshParams::new(config.lsh.b, config.lsh.r, config.minhash.s, config.lsh.max_bucket_fanout)?;

    let own_sigs: Vec<&[u32]> = own_sketches.iter().map(|s| s.minhash.as_slice()).collect();
    let peer_sigs: Vec<&[u32]> = peer_sketches.iter().map(|s| s.minhash.as_slice()).collect();
    let candidate_pairs = lsh.candidate_pairs(&own_sigs, &peer_sigs);

    let mut candidates = Vec::with_capacity(candidate_pairs.len());
    for (own_index, peer_index) in candidate_pairs {
        let own = &own_sketches[own_index];
        let peer = &peer_sketches[peer_index];
        let similarity = similarity::score(&own.bloom, &own.minhash, &peer.bloom, &peer.minhash)?;
        let is_match = matcher::is_match(
            similarity.hamming,
            similarity.jaccard,
            config.matching.hamming_threshold,
            config.matching.jaccard_threshold,
        );
        if is_match {
            candidates.push(MatchCandidate {
                id_a: own.id.clone(),
                id_b: peer.id.clone(),
                hamming: similarity.hamming,
                jaccard: similarity.jaccard,
                is_match,
            });
        }
    }
    Ok(candidates)
}
