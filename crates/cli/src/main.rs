//! # Fleet Coordinator CLI
//!
//! Server binary entry point: flag parsing, logging setup, server boot,
//! graceful shutdown.

mod cli;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use rpc::{CoordServer, CoordService};
use tracing::info;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: (cli.metrics_port != 0).then_some(cli.metrics_port),
        verbosity: cli.verbose,
        quiet: cli.quiet,
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Fleet coordinator starting"
    );

    let config = cli.server_config();
    config.check()?;
    tracing::debug!(
        config = %serde_json::to_string(&config).unwrap_or_default(),
        "Effective configuration"
    );

    let service = CoordService::new(config);

    // a bind failure propagates out of main as a non-zero exit
    let server = CoordServer::bind(service).await?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
