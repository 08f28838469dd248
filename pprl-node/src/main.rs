//! Binary entry point: wires a validated [`RunConfig`], a record source,
//! and a [`pprl_protocol::Session`] together into one end-to-end run.

use std::path::PathBuf;

use clap::Parser;
use eyre::Context;
use pprl_node::match_output;
use pprl_node::record_source::{drain, CsvRecordSource};
use pprl_node::run;
use pprl_types::config::RunConfig;

/// Command-line surface: the exhaustive [`RunConfig`] plus the handful of
/// local-filesystem paths the binary itself needs.
#[derive(Parser, Debug)]
#[command(name = "pprl-node", version, about = "Privacy-preserving record linkage")]
struct Cli {
    #[command(flatten)]
    config: RunConfig,

    /// Path to this party's input CSV.
    #[arg(long)]
    input: PathBuf,

    /// Path to write the assigned match set as CSV.
    #[arg(long)]
    output: PathBuf,

    /// Ground-truth pair CSV (`id_a,id_b`) for the validation harness. When
    /// set, a validation report is written alongside the match output.
    #[arg(long)]
    ground_truth: Option<PathBuf>,

    /// Path to write the validation report, required when `--ground-truth`
    /// is set.
    #[arg(long)]
    validation_report: Option<PathBuf>,

    /// Include the full false-positive/false-negative pair lists in the
    /// validation report.
    #[arg(long)]
    verbose_report: bool,

    /// Path to additionally write the validation report as JSON, the
    /// machine-readable sibling of `--validation-report`'s CSV.
    #[arg(long)]
    validation_report_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let fields = cli.config.validate().context("invalid run configuration")?;

    let source = CsvRecordSource::open(&cli.input).context("opening input CSV")?;
    let (records, skipped) = drain(source).await.context("ingesting input records")?;
    let skip_rate = skipped as f64 / (records.len() + skipped).max(1) as f64;
    if skip_rate > cli.config.skip_rate_cap {
        eyre::bail!(
            "skip rate {skip_rate:.4} exceeded configured cap {}",
            cli.config.skip_rate_cap
        );
    }
    tracing::info!(records = records.len(), skipped, "loaded input records");

    let mut session = connect_session(&cli.config).await.context("establishing peer connection")?;

    session.handshake().await.context("HANDSHAKE failed")?;
    let fingerprint = pprl_protocol::fingerprint::compute(&cli.config, &fields);
    session.agree_params(fingerprint).await.context("PARAM_AGREE failed")?;

    let outcome = run::run(&cli.config, &fields, records, &mut session)
        .await
        .context("match run failed")?;

    let output_file = std::fs::File::create(&cli.output).context("creating match output file")?;
    match_output::write_match_output(output_file, &outcome.matches).context("writing match output")?;

    if !outcome.verified {
        tracing::warn!("VERIFY digests disagreed; match sets between parties are inconsistent");
    }

    if let Some(ground_truth_path) = &cli.ground_truth {
        let report_path = cli
            .validation_report
            .as_ref()
            .ok_or_else(|| eyre::eyre!("--validation-report is required with --ground-truth"))?;
        let ground_truth = read_pairs(ground_truth_path).context("reading ground-truth pairs")?;
        let produced: Vec<(String, String)> =
            outcome.matches.iter().map(|c| (c.id_a.clone(), c.id_b.clone())).collect();
        let metrics = pprl_validate::evaluate(&produced, &ground_truth);
        tracing::info!(?metrics, "validation metrics");
        let report_file = std::fs::File::create(report_path).context("creating validation report file")?;
        pprl_validate::write_report(report_file, &metrics, &produced, &ground_truth, cli.verbose_report)
            .context("writing validation report")?;

        if let Some(json_path) = &cli.validation_report_json {
            let json_file = std::fs::File::create(json_path).context("creating JSON validation report file")?;
            pprl_validate::write_report_json(json_file, &metrics, &produced, &ground_truth, cli.verbose_report)
                .context("writing JSON validation report")?;
        }
    }

    Ok(())
}

async fn connect_session(config: &RunConfig) -> eyre::Result<pprl_protocol::Session> {
    let timeouts = config.timeouts.clone();
    if let Some(host) = &config.peer.host {
        let port = config
            .peer
            .port
            .ok_or_else(|| eyre::eyre!("peer.port is required when peer.host is set"))?;
        tracing::info!(host, port, "dialing peer");
        Ok(pprl_protocol::Session::connect((host.as_str(), port), config.max_frame_bytes, timeouts).await?)
    } else {
        let port = config
            .peer
            .listen_port
            .ok_or_else(|| eyre::eyre!("either peer.host or listen_port must be set"))?;
        tracing::info!(port, "listening for peer");
        Ok(pprl_protocol::Session::listen(("0.0.0.0", port), config.max_frame_bytes, timeouts).await?)
    }
}

fn read_pairs(path: &std::path::Path) -> eyre::Result<Vec<(String, String)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record?;
        let id_a = record.get(0).ok_or_else(|| eyre::eyre!("missing id_a column"))?;
        let id_b = record.get(1).ok_or_else(|| eyre::eyre!("missing id_b column"))?;
        pairs.push((id_a.to_string(), id_b.to_string()));
    }
    Ok(pairs)
}
