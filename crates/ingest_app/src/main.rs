use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use ingest_app::{build_store, exit_code, load_payload, payload_from_flags, AppConfig};
use ingest_core::JobStatus;
use ingest_engine::{CaptureClock, LogProgressSink, Pipeline, StoreToken};
use ingest_logging::{ingest_error, ingest_warn, parse_level, LogDestination};
use tokio_util::sync::CancellationToken;

/// Fetch documents from a listing page, extract their tables and land both
/// in partitioned object storage.
#[derive(Debug, Parser)]
#[command(name = "ingest", version)]
struct Cli {
    /// RON config file.
    #[arg(short, long, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// JSON job payload file, or `-` to read it from stdin.
    #[arg(short, long, conflicts_with_all = ["dataset_name", "base_url"])]
    payload: Option<PathBuf>,

    #[arg(long)]
    dataset_name: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    max_files: Option<i64>,

    /// Filter hint forwarded to the site filter, as `key=value`. Repeatable.
    #[arg(long = "hint", value_name = "KEY=VALUE")]
    hints: Vec<String>,

    /// Partition date to use instead of today (UTC).
    #[arg(long, value_name = "YYYY-MM-DD")]
    capture_date: Option<NaiveDate>,

    /// Overrides the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(status) => ExitCode::from(exit_code(status)),
        Err(err) => {
            ingest_error!("{:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<JobStatus> {
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let level = parse_level(cli.log_level.as_deref().unwrap_or(&config.log_level));
    let destination = match &config.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    ingest_logging::initialize(destination, level);

    let payload = match &cli.payload {
        Some(path) => load_payload(path)?,
        None => payload_from_flags(
            cli.dataset_name.as_deref(),
            cli.base_url.as_deref(),
            cli.max_files,
            &cli.hints,
        )?,
    };

    let token = StoreToken::from_env().context("loading store credentials")?;
    let store = build_store(&config.store, token)?;
    let mut engine = config.engine.to_engine_config();
    if let Some(date) = cli.capture_date {
        engine.capture_clock = CaptureClock::fixed(date);
    }
    let pipeline = Pipeline::new(engine, store).with_sink(Arc::new(LogProgressSink));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let report = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ingest_warn!("Interrupted, cancelling job");
                interrupt.cancel();
            }
        });
        pipeline.run_payload(payload, cancel).await
    })?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.status)
}
