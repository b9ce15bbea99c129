//! Jellyfin Prometheus exporter - CLI binary.
//!
//! Serves Jellyfin session, stream, user and library metrics on
//! `GET /metrics`, querying the Jellyfin API on every scrape.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use jellyfin_exporter::config::LABEL_FORMAT_NOTE;
use jellyfin_exporter::{ExporterArgs, JellyfinClient, JellyfinCollector};
use jellyfin_exporter_common::{init_tracing, ColorWhen, MetricsContext, MetricsServerConfig};

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorWhen {
    fn from(v: ColorArg) -> Self {
        match v {
            ColorArg::Auto => ColorWhen::Auto,
            ColorArg::Always => ColorWhen::Always,
            ColorArg::Never => ColorWhen::Never,
        }
    }
}

/// Jellyfin Exporter - Prometheus metrics for a Jellyfin server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = LABEL_FORMAT_NOTE)]
struct Args {
    // ---
    #[command(flatten)]
    exporter: ExporterArgs,

    /// Coloring
    #[arg(long, value_enum, default_value = "auto")]
    color: ColorArg,
}

/// Capture version number from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    // ---
    let args = Args::parse();

    if let Err(e) = init_tracing(args.color.into()) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(args.exporter).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ExporterArgs) -> Result<()> {
    // ---
    let config = args.into_config()?;

    info!(
        "Starting jellyfin-exporter v{VERSION} for '{}' on {}",
        config.base_url, config.listen
    );
    info!("Active session window: {} minutes", config.active_window.num_minutes());

    let metrics = MetricsContext::new()?;
    let client = JellyfinClient::new(&config, metrics.clone())?;
    let collector = Arc::new(JellyfinCollector::new(&config, client, metrics.clone()));

    let (_addr, server) =
        metrics.spawn_metrics_server(MetricsServerConfig::new(config.listen), collector)?;

    tokio::select! {
        res = server => res.context("metrics server task failed")?,
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for shutdown signal")?;
            info!("Shutting down");
            Ok(())
        }
    }
}
