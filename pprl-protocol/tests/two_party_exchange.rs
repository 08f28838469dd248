//! End-to-end two-party exchange over a real loopback TCP connection:
//! HANDSHAKE, PARAM_AGREE, SKETCH_EXCHANGE and VERIFY, run by two
//! independent tasks playing the listener and dialer roles.

use std::time::Duration;

use pprl_core::blocking::LshParams;
use pprl_core::matcher;
use pprl_core::minhash::MinHashParams;
use pprl_core::similarity;
use pprl_core::tokenizer::{tokenize_record, SketchParams};
use pprl_protocol::session::{Session, VerifyOutcome};
use pprl_types::record::{FieldMethod, FieldSpec, RawRecord};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::net::TcpListener;

/// Picks a free loopback port by binding then immediately dropping the
/// listener, so both parties can be started independently against the same
/// address (mirrors how the binary's `peer.host`/`listen_port` pairing
/// works in practice).
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn test_timeouts() -> pprl_types::config::TimeoutsConfig {
    pprl_types::config::TimeoutsConfig {
        connection: Duration::from_secs(5),
        handshake: Duration::from_secs(5),
        read: Duration::from_secs(5),
        write: Duration::from_secs(5),
        idle: Duration::from_secs(5),
    }
}

fn record(id: &str, first: &str, last: &str, dob: &str, zip: &str) -> RawRecord {
    let mut record = RawRecord::new();
    record.insert("id", id);
    record.insert("FIRST", first);
    record.insert("LAST", last);
    record.insert("DOB", dob);
    record.insert("ZIP", zip);
    record
}

fn fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("FIRST", FieldMethod::Name),
        FieldSpec::new("LAST", FieldMethod::Name),
        FieldSpec::new("DOB", FieldMethod::Date),
        FieldSpec::new("ZIP", FieldMethod::Zip),
    ]
}

fn sketch_params() -> SketchParams {
    SketchParams {
        m: 1000,
        k: 5,
        random_bits_percent: 0.0,
        minhash: MinHashParams::derive("0PsRm4KNmgRSY8ynApUtpXjeO19S7OUE", 1000, 128),
    }
}

/// Mirrors the worked example from the system design: an exact match
/// surviving formatting differences (case, date format, zip+4) with noise
/// disabled.
#[tokio::test]
async fn exact_match_survives_formatting_differences_across_a_real_connection() {
    let port = free_port().await;

    let server = tokio::spawn(run_party(
        ListenOrDial::Listen(port),
        record("a1", "Mary", "Smith", "1985-12-25", "12345"),
    ));

    // Give the listener a moment to rebind the now-freed port before the
    // dialer connects.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = run_party(
        ListenOrDial::Dial(port),
        record("b7", "MARY", "smith", "12/25/1985", "12345-6789"),
    )
    .await;

    let server_matches = server.await.unwrap();
    assert_eq!(client.len(), 1);
    assert_eq!(server_matches.len(), 1);
    // Each side reports the pair with its own id first; the match itself
    // (hamming, jaccard) and the underlying id set are identical.
    assert_eq!(client[0], ("b7".to_string(), "a1".to_string(), 0, 1.0));
    assert_eq!(server_matches[0], ("a1".to_string(), "b7".to_string(), 0, 1.0));
}

enum ListenOrDial {
    Listen(u16),
    Dial(u16),
}

async fn run_party(role: ListenOrDial, own_record: RawRecord) -> Vec<(String, String, u32, f64)> {
    let timeouts = test_timeouts();
    let mut session = match role {
        ListenOrDial::Listen(port) => {
            Session::listen(("127.0.0.1", port), 64 * 1024 * 1024, timeouts).await.unwrap()
        }
        ListenOrDial::Dial(port) => {
            Session::connect(("127.0.0.1", port), 64 * 1024 * 1024, timeouts).await.unwrap()
        }
    };

    session.handshake().await.unwrap();

    let fields = fields();
    let params = sketch_params();
    let fingerprint_config = test_config();
    let fingerprint = pprl_protocol::fingerprint::compute(&fingerprint_config, &fields);
    session.agree_params(fingerprint).await.unwrap();

    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let own_sketch = tokenize_record(&own_record, &fields, &params, &mut rng);
    let peer_sketches = session.exchange_sketches(vec![own_sketch.clone()], params.k).await.unwrap();

    let lsh = LshParams::new(16, 8, 128, 10_000).unwrap();
    let own_sigs: Vec<&[u32]> = vec![own_sketch.minhash.as_slice()];
    let peer_sigs: Vec<&[u32]> = peer_sketches.iter().map(|s| s.minhash.as_slice()).collect();
    let candidate_pairs = lsh.candidate_pairs(&own_sigs, &peer_sigs);

    let mut candidates = Vec::new();
    for (own_index, peer_index) in candidate_pairs {
        let peer = &peer_sketches[peer_index];
        let similarity = similarity::score(&own_sketch.bloom, &own_sketch.minhash, &peer.bloom, &peer.minhash).unwrap();
        let is_match = matcher::is_match(similarity.hamming, similarity.jaccard, 90, 0.5);
        if is_match {
            candidates.push(matcher::MatchCandidate {
                id_a: own_sketch.id.clone(),
                id_b: peer.id.clone(),
                hamming: similarity.hamming,
                jaccard: similarity.jaccard,
                is_match,
            });
        }
        let _ = own_index;
    }

    let assigned = matcher::assign(candidates, false, params.m);
    let pairs: Vec<(String, String)> = assigned.iter().map(|c| (c.id_a.clone(), c.id_b.clone())).collect();

    match session.verify(&pairs).await.unwrap() {
        VerifyOutcome::Agreed => {}
        VerifyOutcome::Disagreed { .. } => panic!("VERIFY digests disagreed"),
    }

    assigned.into_iter().map(|c| (c.id_a, c.id_b, c.hamming, c.jaccard)).collect()
}

fn test_config() -> pprl_types::config::RunConfig {
    pprl_types::config::RunConfig {
        database: pprl_types::config::DatabaseConfig {
            fields: vec!["name:FIRST".to_string(), "name:LAST".to_string(), "date:DOB".to_string(), "zip:ZIP".to_string()],
            random_bits_percent: 0.0,
        },
        matching: pprl_types::config::MatchingConfig {
            hamming_threshold: 90,
            jaccard_threshold: 0.5,
            allow_duplicates: false,
        },
        minhash: pprl_types::config::MinHashConfig {
            m: 1000,
            s: 128,
            seed: "0PsRm4KNmgRSY8ynApUtpXjeO19S7OUE".to_string(),
        },
        bloom: pprl_types::config::BloomConfig { k: 5 },
        lsh: pprl_types::config::LshConfig { b: 16, r: 8, max_bucket_fanout: 10_000 },
        peer: pprl_types::config::PeerConfig { host: None, port: None, listen_port: None },
        timeouts: test_timeouts(),
        batch_size: 1000,
        max_frame_bytes: 64 * 1024 * 1024,
        skip_rate_cap: 0.05,
    }
}
