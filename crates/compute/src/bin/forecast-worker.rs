//! forecast-worker: keeps the forecast/anomaly snapshot fresh.
//!
//! Runs one refresh cycle at startup, then one per interval until Ctrl-C.
//! With `--once` it runs a single cycle, prints the machine summary as JSON
//! and exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use sensorcast_compute::pipeline::views::{anomaly_view, machine_summary, ThresholdPolicy};
use sensorcast_compute::pipeline::Pipeline;
use sensorcast_compute::scheduler::{RefreshScheduler, SchedulerConfig};
use sensorcast_core::config::{load_dotenv, Config};
use sensorcast_core::DataSource;
use sensorcast_ingest::{JsonFileSource, SyntheticConfig, SyntheticSource};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceKind {
    Synthetic,
    File,
    Mysql,
}

/// Forecast worker: periodic retraining, forecasting and anomaly scoring.
#[derive(Parser, Debug)]
#[command(name = "forecast-worker", version, about)]
struct Cli {
    /// Config profile; overrides SENSORCAST_PROFILE.
    #[arg(long)]
    profile: Option<String>,

    /// Where raw sensor rows come from.
    #[arg(long, value_enum, env = "SENSORCAST_SOURCE", default_value = "synthetic")]
    source: SourceKind,

    /// JSON or JSON-lines file, for `--source file`.
    #[arg(long, env = "SENSORCAST_FILE")]
    file: Option<PathBuf>,

    /// Run a single cycle, print the summary and exit.
    #[arg(long)]
    once: bool,
}

fn build_source(cli: &Cli, config: &Config) -> anyhow::Result<Arc<dyn DataSource>> {
    match cli.source {
        SourceKind::Synthetic => {
            let synthetic = SyntheticConfig {
                sensors: config.pipeline.targets.clone(),
                step: config.pipeline.frequency(),
                ..SyntheticConfig::default()
            };
            Ok(Arc::new(SyntheticSource::new(synthetic)))
        }
        SourceKind::File => {
            let path = cli
                .file
                .clone()
                .context("--source file needs --file or SENSORCAST_FILE")?;
            Ok(Arc::new(
                JsonFileSource::new(path).with_timestamp_field(&config.database.timestamp_column),
            ))
        }
        #[cfg(feature = "mysql")]
        SourceKind::Mysql => {
            if !config.database.is_configured() {
                warn!("DB_USER not set, connecting as root");
            }
            Ok(Arc::new(sensorcast_ingest::MySqlSource::new(&config.database)?))
        }
        #[cfg(not(feature = "mysql"))]
        SourceKind::Mysql => bail!("built without the `mysql` feature"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = match &cli.profile {
        Some(p) => Config::for_profile(p),
        None => Config::from_env(),
    };
    config.log_summary();

    let source = build_source(&cli, &config)?;
    let pipeline = Arc::new(Pipeline::new(config.pipeline.clone())?);
    let scheduler = Arc::new(RefreshScheduler::new(
        SchedulerConfig::from(&config.refresh),
        pipeline,
        source,
    ));

    if cli.once {
        let result = match scheduler.run_cycle().await {
            Ok(r) => r,
            Err(e) => bail!("refresh cycle failed: {}", e),
        };
        let now_local = Utc::now()
            .with_timezone(&config.pipeline.utc_offset())
            .naive_local();
        let summary = machine_summary(&result, now_local).context("empty result frame")?;
        println!("{}", serde_json::to_string_pretty(&summary)?);

        for name in config.pipeline.targets.iter() {
            let view = anomaly_view(&result, name, ThresholdPolicy::default())?;
            info!(
                sensor = %name,
                status = ?view.status,
                latest = ?view.latest_score,
                threshold = ?view.threshold,
                "anomaly status"
            );
        }
        return Ok(());
    }

    let handle = Arc::clone(&scheduler).start().await;
    info!("forecast-worker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    scheduler.shutdown();
    if let Err(e) = handle.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }

    let m = scheduler.metrics();
    info!(
        published = m.cycles_published,
        failed = m.cycles_failed,
        "forecast-worker stopped"
    );
    Ok(())
}
