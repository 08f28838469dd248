//! The parameter fingerprint exchanged during `PARAM_AGREE`: a SHA-256 over
//! every value that must agree byte-for-byte between the two parties before
//! a sketch exchanged by one is comparable to a sketch produced by the
//! other. This is the sole safeguard against a silently-wrong match.

use pprl_core::P;
use pprl_types::record::FieldSpec;
use pprl_types::config::RunConfig;
use sha2::{Digest, Sha256};

/// Computes the canonical parameter fingerprint over
/// `(m, k, s, b, r, P, seed, H, J, field_list_with_methods)`.
///
/// The byte form is fixed and language-independent: each integer is
/// encoded as an 8-byte big-endian `u64`, each float as its big-endian IEEE
/// bit pattern, each string is length-prefixed (4-byte big-endian length)
/// followed by its UTF-8 bytes, and the field list is the count followed by
/// each field's method-then-column in declared order.
pub fn compute(config: &RunConfig, fields: &[FieldSpec]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    push_u64(&mut hasher, config.minhash.m as u64);
    push_u64(&mut hasher, config.bloom.k as u64);
    push_u64(&mut hasher, config.minhash.s as u64);
    push_u64(&mut hasher, config.lsh.b as u64);
    push_u64(&mut hasher, config.lsh.r as u64);
    push_u64(&mut hasher, P);
    push_str(&mut hasher, &config.minhash.seed);
    push_u64(&mut hasher, config.matching.hamming_threshold as u64);
    push_f64(&mut hasher, config.matching.jaccard_threshold);

    push_u64(&mut hasher, fields.len() as u64);
    for field in fields {
        push_str(&mut hasher, &field.method.to_string());
        push_str(&mut hasher, &field.column);
    }

    hasher.finalize().into()
}

fn push_u64(hasher: &mut Sha256, value: u64) {
    hasher.update(value.to_be_bytes());
}

fn push_f64(hasher: &mut Sha256, value: f64) {
    hasher.update(value.to_bits().to_be_bytes());
}

fn push_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u32).to_be_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pprl_types::record::FieldMethod;
    use std::time::Duration;

    fn base_config() -> RunConfig {
        RunConfig {
            database: pprl_types::config::DatabaseConfig {
                fields: vec!["name:FIRST".to_string()],
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
                seed: "fixed-seed".to_string(),
            },
            bloom: pprl_types::config::BloomConfig { k: 5 },
            lsh: pprl_types::config::LshConfig { b: 16, r: 8, max_bucket_fanout: 10_000 },
            peer: pprl_types::config::PeerConfig { host: None, port: None, listen_port: None },
            timeouts: pprl_types::config::TimeoutsConfig {
                connection: Duration::from_secs(30),
                handshake: Duration::from_secs(30),
                read: Duration::from_secs(60),
                write: Duration::from_secs(60),
                idle: Duration::from_secs(300),
            },
            batch_size: 1000,
            max_frame_bytes: 64 * 1024 * 1024,
            skip_rate_cap: 0.05,
        }
    }

    #[test]
    fn identical_configs_fingerprint_identically() {
        let config = base_config();
        let fields = vec![FieldSpec::new("FIRST", FieldMethod::Name)];
        assert_eq!(compute(&config, &fields), compute(&config, &fields));
    }

    #[test]
    fn differing_s_changes_the_fingerprint() {
        let config = base_config();
        let fields = vec![FieldSpec::new("FIRST", FieldMethod::Name)];
        let a = compute(&config, &fields);
        let mut other = config.clone();
        other.minhash.s = 64;
        let b = compute(&other, &fields);
        assert_ne!(a, b);
    }

    #[test]
    fn differing_field_order_changes_the_fingerprint() {
        let config = base_config();
        let a = vec![
            FieldSpec::new("FIRST", FieldMethod::Name),
            FieldSpec::new("LAST", FieldMethod::Name),
        ];
        let b = vec![
            FieldSpec::new("LAST", FieldMethod::Name),
            FieldSpec::new("FIRST", FieldMethod::Name),
        ];
        assert_ne!(compute(&config, &a), compute(&config, &b));
    }
}
