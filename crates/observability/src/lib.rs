//! # Observability
//!
//! Tracing + Prometheus bootstrap for the coordinator binary, plus metric
//! recording helpers and end-of-scenario aggregation.

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_barrier_closed, record_drain_batch, record_registration, ScenarioStatsAggregator,
    StatsSummary, TickStats,
};

/// Observability configuration, assembled from the server's CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    /// Log output format
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Verbosity bumps below RUST_LOG: 0 = info, 1 = debug, 2+ = trace
    pub verbosity: u8,
    /// Errors and warnings only, regardless of verbosity
    pub quiet: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

/// Initialize tracing and (optionally) the Prometheus exporter.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = if config.quiet {
        EnvFilter::new("warn")
    } else {
        let default_level = match config.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Initialize only the Prometheus exporter (tracing already set up
/// elsewhere).
pub fn init_metrics_only(port: u16) -> Result<()> {
    let builder = PrometheusBuilder::new();
    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
