//! Main entry point for the sync-extractor CLI

use clap::Parser;
use sync_extractor::cli::{Cli, Commands};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sync_extractor=info"));

    // Logs go to stderr; stdout carries the emitted signals
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = sync_extractor::metrics::init_metrics(addr).await {
            warn!(error = %e, "Metrics exporter unavailable, continuing without it");
        }
    }

    let result = match cli.command {
        Commands::Run(ref args) => args.execute().await.map_err(|e| anyhow::anyhow!(e)),
        Commands::State(ref args) => args.execute().await.map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
