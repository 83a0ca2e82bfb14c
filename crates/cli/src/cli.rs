//! CLI argument definitions using clap.

use clap::{Parser, ValueEnum};
use contracts::{KeepaliveConfig, ServerConfig};

/// Fleet Coordinator - tick-synchronization server for a distributed
/// driving-simulation fabric
#[derive(Parser, Debug)]
#[command(
    name = "fleet-coordinator",
    author,
    version,
    about = "Central tick-synchronization server for distributed driving simulation",
    long_about = "Registers vehicle clients, fans simulation ticks out to the fleet,\n\
                  collects per-tick replies behind a completion barrier, and notifies\n\
                  the simulation API host. In edge mode it also relays waypoint plans\n\
                  from the API host down to vehicles."
)]
pub struct Cli {
    /// Listening port for the RPC surface
    #[arg(long, default_value = "50051", env = "FLEET_COORD_PORT")]
    pub port: u16,

    /// Port where the simulation API host receives pushes
    #[arg(long, default_value = "50061", env = "FLEET_COORD_PUSH_API_PORT")]
    pub push_api_port: u16,

    /// Base port for per-vehicle push listeners (reserved)
    #[arg(long, default_value = "50101", env = "FLEET_COORD_PUSH_BASE_PORT")]
    pub push_base_port: u16,

    /// Host where the simulation API push listener lives
    #[arg(long, default_value = "localhost", env = "FLEET_COORD_API_HOST")]
    pub api_host: String,

    /// Vehicle updates per drain batch, keeps responses under the transport
    /// message ceiling
    #[arg(long, default_value = "32", env = "FLEET_COORD_UPDATE_BATCH_SIZE")]
    pub update_batch_size: u16,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FLEET_COORD_METRICS_PORT")]
    pub metrics_port: u16,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, env = "FLEET_COORD_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        env = "FLEET_COORD_LOG_FORMAT"
    )]
    pub log_format: LogFormat,
}

impl Cli {
    /// Assemble the server configuration from the parsed flags.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            push_api_port: self.push_api_port,
            push_base_port: self.push_base_port,
            api_host: self.api_host.clone(),
            update_batch_size: self.update_batch_size,
            keepalive: KeepaliveConfig::default(),
            ..Default::default()
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_server_config() {
        let cli = Cli::parse_from(["fleet-coordinator"]);
        let config = cli.server_config();
        assert_eq!(config.port, 50051);
        assert_eq!(config.push_api_port, 50061);
        assert_eq!(config.push_base_port, 50101);
        assert_eq!(config.update_batch_size, 32);
        assert!(config.check().is_ok());
    }

    #[test]
    fn batch_size_override() {
        let cli = Cli::parse_from(["fleet-coordinator", "--update-batch-size", "64"]);
        assert_eq!(cli.server_config().update_batch_size, 64);
    }
}
