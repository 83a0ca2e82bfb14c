//! Server and scenario configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{CoordError, SimulationInfo, VehicleIndex};

/// HTTP/2-style keepalive settings applied per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    /// Interval between server-initiated pings on an idle connection.
    pub interval_secs: u64,
    /// How long to wait for the pong before declaring the peer dead.
    pub timeout_secs: u64,
    /// Whether to ping even with no calls in flight.
    pub permit_without_calls: bool,
    /// Minimum accepted interval between inbound pings; faster pings close
    /// the connection.
    pub min_recv_interval_secs: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10 * 60,
            timeout_secs: 20,
            permit_without_calls: true,
            min_recv_interval_secs: 10,
        }
    }
}

impl KeepaliveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_recv_interval(&self) -> Duration {
        Duration::from_secs(self.min_recv_interval_secs)
    }
}

/// Coordinator server configuration.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_ports"))]
pub struct ServerConfig {
    /// Listening port for the RPC surface.
    #[validate(range(min = 1))]
    pub port: u16,

    /// Port where the simulation API host receives pushes.
    #[validate(range(min = 1))]
    pub push_api_port: u16,

    /// Base port for per-vehicle push listeners (vehicle N listens on
    /// base + N). Reserved; vehicles currently announce their own port.
    #[validate(range(min = 1))]
    pub push_base_port: u16,

    /// Host where the simulation API push listener lives.
    #[validate(length(min = 1))]
    pub api_host: String,

    /// Maximum vehicle updates per drain batch, keeps responses under the
    /// transport message ceiling.
    #[validate(range(min = 1))]
    pub update_batch_size: u16,

    /// Queue depth of each per-vehicle push worker.
    #[validate(range(min = 1))]
    pub push_queue_capacity: u16,

    pub keepalive: KeepaliveConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 50051,
            push_api_port: 50061,
            push_base_port: 50101,
            api_host: "localhost".to_string(),
            update_batch_size: 32,
            push_queue_capacity: 8,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Address of the simulation API host's push listener.
    pub fn api_push_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.push_api_port)
    }

    /// Validate field ranges and cross-field constraints.
    pub fn check(&self) -> Result<(), CoordError> {
        self.validate().map_err(|errors| {
            let field = errors
                .field_errors()
                .keys()
                .next()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "config".to_string());
            CoordError::config_validation(field, errors.to_string())
        })
    }
}

fn validate_ports(config: &ServerConfig) -> Result<(), validator::ValidationError> {
    if config.port == config.push_api_port {
        let mut err = validator::ValidationError::new("port_clash");
        err.message = Some("server port and push api port must differ".into());
        return Err(err);
    }
    if config.keepalive.timeout_secs >= config.keepalive.interval_secs {
        let mut err = validator::ValidationError::new("keepalive");
        err.message = Some("keepalive timeout must be shorter than the interval".into());
        return Err(err);
    }
    Ok(())
}

/// Immutable description of the running scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Opaque scenario configuration blob (YAML text), relayed to vehicles
    /// verbatim.
    pub test_scenario: String,
    pub application: String,
    pub version: String,
    pub num_cars: VehicleIndex,
    pub is_edge: bool,
}

impl ScenarioConfig {
    /// Build from a `Server_StartScenario` request (car count travels in the
    /// dual-use `vehicle_index` field).
    pub fn from_start_request(info: &SimulationInfo) -> Self {
        Self {
            test_scenario: info.test_scenario.clone(),
            application: info.application.clone(),
            version: info.version.clone(),
            num_cars: info.car_count(),
            is_edge: info.is_edge,
        }
    }

    /// Registration reply for a newly assigned vehicle index.
    pub fn registration_reply(&self, assigned: VehicleIndex) -> SimulationInfo {
        SimulationInfo {
            vehicle_index: assigned,
            test_scenario: self.test_scenario.clone(),
            application: self.application.clone(),
            version: self.version.clone(),
            is_edge: self.is_edge,
        }
    }
}
