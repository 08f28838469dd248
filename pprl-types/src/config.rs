//! Run configuration: the exhaustively-enumerated set of recognized fields
//! from the system design's External Interfaces section.
//!
//! Mirrors the shape of a node configuration in the surrounding ecosystem:
//! every value can be set via `--flag`, via environment variable, or
//! (because [`RunConfig`] also derives `serde::Deserialize`) loaded from a
//! YAML document by the hosting binary. Construction never performs
//! clever defaulting beyond what is written here; [`RunConfig::validate`]
//! is the single place cross-field invariants are checked.

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::record::FieldSpec;

/// The published fixed seed used when no seed is configured.
pub const DEFAULT_MINHASH_SEED: &str = "0PsRm4KNmgRSY8ynApUtpXjeO19S7OUE";

fn default_m() -> usize {
    1000
}
fn default_s() -> usize {
    128
}
fn default_seed() -> String {
    DEFAULT_MINHASH_SEED.to_string()
}
fn default_k() -> u32 {
    5
}
fn default_b() -> usize {
    16
}
fn default_r() -> usize {
    8
}
fn default_hamming_threshold() -> u32 {
    90
}
fn default_jaccard_threshold() -> f64 {
    0.5
}
fn default_random_bits_percent() -> f64 {
    0.0
}
fn default_max_bucket_fanout() -> usize {
    10_000
}
fn default_batch_size() -> usize {
    1000
}
fn default_max_frame_bytes() -> u32 {
    64 * 1024 * 1024
}
fn default_skip_rate_cap() -> f64 {
    0.05
}

/// Database/field declaration settings (spec `database.*`).
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Ordered list of `"<method>:<column>"` or bare `"<column>"` entries.
    #[clap(long = "database.fields", env = "PPRL_DATABASE_FIELDS", value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Fraction of clear Bloom bits to flip to set, per record, per run.
    #[clap(
        long = "database.random-bits-percent",
        env = "PPRL_RANDOM_BITS_PERCENT",
        default_value_t = default_random_bits_percent()
    )]
    #[serde(default = "default_random_bits_percent")]
    pub random_bits_percent: f64,
}

/// Matching/threshold settings (spec `matching.*`).
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Maximum Hamming distance (on Bloom filters) for a match.
    #[clap(
        long = "matching.hamming-threshold",
        env = "PPRL_HAMMING_THRESHOLD",
        default_value_t = default_hamming_threshold()
    )]
    #[serde(default = "default_hamming_threshold")]
    pub hamming_threshold: u32,

    /// Minimum MinHash Jaccard estimate for a match.
    #[clap(
        long = "matching.jaccard-threshold",
        env = "PPRL_JACCARD_THRESHOLD",
        default_value_t = default_jaccard_threshold()
    )]
    #[serde(default = "default_jaccard_threshold")]
    pub jaccard_threshold: f64,

    /// Whether to allow an id to appear in more than one output pair.
    #[clap(long = "matching.allow-duplicates", env = "PPRL_ALLOW_DUPLICATES")]
    #[serde(default)]
    pub allow_duplicates: bool,
}

/// MinHash parameter-block settings (spec `minhash.*`).
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct MinHashConfig {
    /// Bloom filter bit length `m`.
    #[clap(long = "minhash.m", env = "PPRL_MINHASH_M", default_value_t = default_m())]
    #[serde(default = "default_m")]
    pub m: usize,

    /// MinHash signature length `s`.
    #[clap(long = "minhash.s", env = "PPRL_MINHASH_S", default_value_t = default_s())]
    #[serde(default = "default_s")]
    pub s: usize,

    /// Seed string both parties must agree on.
    #[clap(long = "minhash.seed", env = "PPRL_MINHASH_SEED", default_value_t = default_seed())]
    #[serde(default = "default_seed")]
    pub seed: String,
}

/// Bloom-filter settings (spec `bloom.*`).
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct BloomConfig {
    /// Number of double-hash probes per inserted q-gram.
    #[clap(long = "bloom.k", env = "PPRL_BLOOM_K", default_value_t = default_k())]
    #[serde(default = "default_k")]
    pub k: u32,
}

/// LSH banding settings (spec `lsh.*`).
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct LshConfig {
    /// Number of bands.
    #[clap(long = "lsh.b", env = "PPRL_LSH_B", default_value_t = default_b())]
    #[serde(default = "default_b")]
    pub b: usize,

    /// Rows per band.
    #[clap(long = "lsh.r", env = "PPRL_LSH_R", default_value_t = default_r())]
    #[serde(default = "default_r")]
    pub r: usize,

    /// Maximum ids returned from a single over-full band bucket.
    #[clap(
        long = "lsh.max-bucket-fanout",
        env = "PPRL_LSH_MAX_BUCKET_FANOUT",
        default_value_t = default_max_bucket_fanout()
    )]
    #[serde(default = "default_max_bucket_fanout")]
    pub max_bucket_fanout: usize,
}

/// Transport settings (spec `peer.*`/`listen_port`).
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// The remote peer's host, when dialing.
    #[clap(long = "peer.host", env = "PPRL_PEER_HOST")]
    pub host: Option<String>,

    /// The remote peer's port, when dialing.
    #[clap(long = "peer.port", env = "PPRL_PEER_PORT")]
    pub port: Option<u16>,

    /// The local port to bind, when listening.
    #[clap(long = "listen-port", env = "PPRL_LISTEN_PORT")]
    pub listen_port: Option<u16>,
}

/// Deadline settings (spec `timeouts.*`), seconds-precision wall-clock
/// durations parsed the same way `humantime` parses them elsewhere in the
/// ecosystem.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Deadline to establish the TCP connection.
    #[clap(
        long = "timeouts.connection",
        env = "PPRL_TIMEOUT_CONNECTION",
        default_value = "30s",
        value_parser = humantime::parse_duration,
    )]
    #[serde(with = "humantime_serde", default = "default_connection_timeout")]
    pub connection: Duration,

    /// Deadline for the HANDSHAKE state.
    #[clap(
        long = "timeouts.handshake",
        env = "PPRL_TIMEOUT_HANDSHAKE",
        default_value = "30s",
        value_parser = humantime::parse_duration,
    )]
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub handshake: Duration,

    /// Deadline for any single framed read.
    #[clap(
        long = "timeouts.read",
        env = "PPRL_TIMEOUT_READ",
        default_value = "60s",
        value_parser = humantime::parse_duration,
    )]
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read: Duration,

    /// Deadline for any single framed write.
    #[clap(
        long = "timeouts.write",
        env = "PPRL_TIMEOUT_WRITE",
        default_value = "60s",
        value_parser = humantime::parse_duration,
    )]
    #[serde(with = "humantime_serde", default = "default_write_timeout")]
    pub write: Duration,

    /// Idle deadline for the whole connection.
    #[clap(
        long = "timeouts.idle",
        env = "PPRL_TIMEOUT_IDLE",
        default_value = "300s",
        value_parser = humantime::parse_duration,
    )]
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle: Duration,
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_handshake_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_write_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_idle_timeout() -> Duration {
    Duration::from_secs(300)
}

/// The exhaustive recognized run configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "pprl-node", version, about = "Privacy-preserving record linkage")]
pub struct RunConfig {
    /// Field declarations and Bloom noise settings.
    #[command(flatten)]
    pub database: DatabaseConfig,
    /// Similarity thresholds and assignment policy.
    #[command(flatten)]
    pub matching: MatchingConfig,
    /// MinHash parameter-block settings.
    #[command(flatten)]
    pub minhash: MinHashConfig,
    /// Bloom filter settings.
    #[command(flatten)]
    pub bloom: BloomConfig,
    /// LSH banding settings.
    #[command(flatten)]
    pub lsh: LshConfig,
    /// Transport settings.
    #[command(flatten)]
    pub peer: PeerConfig,
    /// Per-message/connection deadlines.
    #[command(flatten)]
    pub timeouts: TimeoutsConfig,

    /// Batch size used for streaming tokenization (records held in memory
    /// at once is proportional to this, not to dataset size).
    #[clap(long, env = "PPRL_BATCH_SIZE", default_value_t = default_batch_size())]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum accepted wire-frame size in bytes.
    #[clap(long, env = "PPRL_MAX_FRAME_BYTES", default_value_t = default_max_frame_bytes())]
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,

    /// Fraction of input records allowed to be skipped (as `DataError`s)
    /// before the run is escalated to fatal.
    #[clap(long, env = "PPRL_SKIP_RATE_CAP", default_value_t = default_skip_rate_cap())]
    #[serde(default = "default_skip_rate_cap")]
    pub skip_rate_cap: f64,
}

impl RunConfig {
    /// Parses the `database.fields` entries into [`FieldSpec`]s and
    /// validates every cross-field invariant named in the system design.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] encountered: an unknown
    /// normalization method, a duplicate field column, a banding
    /// mismatch (`b * r != s`), or an out-of-range threshold.
    pub fn validate(&self) -> Result<Vec<FieldSpec>, ConfigError> {
        if self.database.fields.is_empty() {
            return Err(ConfigError::NoFields);
        }
        let mut fields = Vec::with_capacity(self.database.fields.len());
        let mut seen = std::collections::HashSet::new();
        for entry in &self.database.fields {
            let spec = FieldSpec::parse(entry)?;
            if !seen.insert(spec.column.clone()) {
                return Err(ConfigError::DuplicateField {
                    column: spec.column,
                });
            }
            fields.push(spec);
        }

        if !(0.0..1.0).contains(&self.database.random_bits_percent) {
            return Err(ConfigError::RandomBitsOutOfRange {
                r: self.database.random_bits_percent,
            });
        }
        if !(0.0..=1.0).contains(&self.matching.jaccard_threshold) {
            return Err(ConfigError::JaccardThresholdOutOfRange {
                j: self.matching.jaccard_threshold,
            });
        }
        if self.matching.hamming_threshold as usize > self.minhash.m {
            return Err(ConfigError::HammingThresholdOutOfRange {
                h: self.matching.hamming_threshold,
                m: self.minhash.m,
            });
        }
        if self.lsh.b * self.lsh.r != self.minhash.s {
            return Err(ConfigError::BandingMismatch {
                b: self.lsh.b,
                r: self.lsh.r,
                s: self.minhash.s,
            });
        }

        Ok(fields)
    }

    /// Parses a [`RunConfig`] from a YAML document.
    ///
    /// This is the sole named touch-point for configuration file loading;
    /// it performs no overlay, interpolation, or schema inference beyond
    /// what `serde` does for the struct above.
    ///
    /// # Errors
    /// Returns the underlying `serde_yaml` error on malformed YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RunConfig {
        RunConfig {
            database: DatabaseConfig {
                fields: vec!["name:FIRST".to_string(), "LAST".to_string()],
                random_bits_percent: 0.0,
            },
            matching: MatchingConfig {
                hamming_threshold: 90,
                jaccard_threshold: 0.5,
                allow_duplicates: false,
            },
            minhash: MinHashConfig {
                m: 1000,
                s: 128,
                seed: DEFAULT_MINHASH_SEED.to_string(),
            },
            bloom: BloomConfig { k: 5 },
            lsh: LshConfig {
                b: 16,
                r: 8,
                max_bucket_fanout: 10_000,
            },
            peer: PeerConfig {
                host: None,
                port: None,
                listen_port: None,
            },
            timeouts: TimeoutsConfig {
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
    fn default_shaped_config_validates() {
        let fields = base_config().validate().unwrap();
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn rejects_banding_mismatch() {
        let mut config = base_config();
        config.lsh.r = 7;
        assert_eq!(
            config.validate(),
            Err(ConfigError::BandingMismatch { b: 16, r: 7, s: 128 })
        );
    }

    #[test]
    fn rejects_hamming_threshold_over_m() {
        let mut config = base_config();
        config.matching.hamming_threshold = 2000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HammingThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_jaccard() {
        let mut config = base_config();
        config.matching.jaccard_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::JaccardThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_empty_fields() {
        let mut config = base_config();
        config.database.fields.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoFields));
    }

    #[test]
    fn rejects_duplicate_fields() {
        let mut config = base_config();
        config.database.fields = vec!["FIRST".to_string(), "name:FIRST".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateField { .. })
        ));
    }

    #[test]
    fn loads_from_yaml() {
        let yaml = r#"
database:
  fields: ["name:FIRST", "date:DOB"]
matching: {}
minhash: {}
bloom: {}
lsh: {}
peer: {}
timeouts: {}
"#;
        let config = RunConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.database.fields, vec!["name:FIRST", "date:DOB"]);
        assert_eq!(config.minhash.m, 1000);
        let fields = config.validate().unwrap();
        assert_eq!(fields.len(), 2);
    }
}
