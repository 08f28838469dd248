//! Drives the same pipeline `main` wires together — CSV ingestion, the
//! two-party session, matching, and the validation harness — end to end
//! over a real loopback connection, using the library surface instead of
//! spawning the binary.

use std::io::Write as _;
use std::time::Duration;

use pprl_node::match_output::write_match_output;
use pprl_node::record_source::{drain, CsvRecordSource};
use pprl_node::run;
use pprl_protocol::Session;
use pprl_types::config::{
    BloomConfig, DatabaseConfig, LshConfig, MatchingConfig, MinHashConfig, PeerConfig, RunConfig, TimeoutsConfig,
};

fn timeouts() -> TimeoutsConfig {
    TimeoutsConfig {
        connection: Duration::from_secs(5),
        handshake: Duration::from_secs(5),
        read: Duration::from_secs(5),
        write: Duration::from_secs(5),
        idle: Duration::from_secs(5),
    }
}

fn config() -> RunConfig {
    RunConfig {
        database: DatabaseConfig {
            fields: vec!["name:FIRST".to_string(), "name:LAST".to_string(), "date:DOB".to_string(), "zip:ZIP".to_string()],
            random_bits_percent: 0.0,
        },
        matching: MatchingConfig { hamming_threshold: 10, jaccard_threshold: 0.9, allow_duplicates: false },
        minhash: MinHashConfig { m: 1000, s: 128, seed: "0PsRm4KNmgRSY8ynApUtpXjeO19S7OUE".to_string() },
        bloom: BloomConfig { k: 5 },
        lsh: LshConfig { b: 16, r: 8, max_bucket_fanout: 10_000 },
        peer: PeerConfig { host: None, port: None, listen_port: None },
        timeouts: timeouts(),
        batch_size: 1000,
        max_frame_bytes: 64 * 1024 * 1024,
        skip_rate_cap: 0.05,
    }
}

fn write_csv(rows: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "id,FIRST,LAST,DOB,ZIP").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file.flush().unwrap();
    file
}

/// Mirrors the worked "near miss rejected" scenario: a true match and a
/// near-miss that the configured thresholds reject, carried through CSV
/// ingestion, a real two-party exchange, matching, and match-output CSV
/// writing exactly as the binary performs them.
#[tokio::test]
async fn csv_to_csv_run_matches_exact_and_rejects_near_miss() {
    let party_a = write_csv(&["a1,Mary,Smith,1985-12-25,12345", "a2,John,Doe,1970-01-01,54321"]);
    let party_b = write_csv(&["b7,MARY,smith,12/25/1985,12345-6789", "b8,Jhon,Doe,1970-01-02,54321"]);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let a_path = party_a.path().to_path_buf();
    let server = tokio::spawn(async move {
        let config = config();
        let fields = config.validate().unwrap();
        let (records, skipped) = drain(CsvRecordSource::open(&a_path).unwrap()).await.unwrap();
        assert_eq!(skipped, 0);

        let mut session = Session::listen(("127.0.0.1", port), config.max_frame_bytes, config.timeouts.clone())
            .await
            .unwrap();
        session.handshake().await.unwrap();
        let fingerprint = pprl_protocol::fingerprint::compute(&config, &fields);
        session.agree_params(fingerprint).await.unwrap();

        let outcome = run::run(&config, &fields, records, &mut session).await.unwrap();
        assert!(outcome.verified);

        let mut buf = Vec::new();
        write_match_output(&mut buf, &outcome.matches).unwrap();
        String::from_utf8(buf).unwrap()
    });

    // Give the listener a moment to rebind the now-freed port.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let config = config();
    let fields = config.validate().unwrap();
    let (records, skipped) = drain(CsvRecordSource::open(party_b.path()).unwrap()).await.unwrap();
    assert_eq!(skipped, 0);

    let mut session = Session::connect(("127.0.0.1", port), config.max_frame_bytes, config.timeouts.clone())
        .await
        .unwrap();
    session.handshake().await.unwrap();
    let fingerprint = pprl_protocol::fingerprint::compute(&config, &fields);
    session.agree_params(fingerprint).await.unwrap();

    let outcome = run::run(&config, &fields, records, &mut session).await.unwrap();
    assert!(outcome.verified);

    let mut buf = Vec::new();
    write_match_output(&mut buf, &outcome.matches).unwrap();
    let b_output = String::from_utf8(buf).unwrap();
    let a_output = server.await.unwrap();

    // Only the exact match survives; the near-miss pair (a2/b8 have a
    // differently-spelled first name and off-by-one DOB) is rejected by
    // H=90, J=0.5.
    assert_eq!(a_output, "id_a,id_b,hamming,jaccard,is_match\na1,b7,0,1.0,true\n");
    assert_eq!(b_output, "id_a,id_b,hamming,jaccard,is_match\nb7,a1,0,1.0,true\n");
}
