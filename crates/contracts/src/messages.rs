//! Wire messages exchanged between vehicles, the coordinator, and the
//! simulation API host.

use serde::{Deserialize, Serialize};

use crate::{Command, VehicleIndex, VehicleState};

/// Zero-field response body for unary acknowledgements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// One logical step of the simulation clock.
///
/// Dual use on the wire: during registration the upstream notification
/// repurposes `tick_id` to carry the node census. Use [`Tick::census`] and
/// [`Tick::node_count`] rather than reading the field directly in that
/// context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub tick_id: i32,
    pub command: Command,
    /// `duration_ns` of the reply that closed the previous barrier; a coarse
    /// tail-latency sample, not an aggregate.
    pub last_client_duration_ns: i64,
}

impl Tick {
    pub fn new(tick_id: i32, command: Command, last_client_duration_ns: i64) -> Self {
        Self {
            tick_id,
            command,
            last_client_duration_ns,
        }
    }

    /// Registration-complete notification: the node census travels in the
    /// `tick_id` field.
    pub fn census(node_count: i16, command: Command) -> Self {
        Self {
            tick_id: node_count as i32,
            command,
            last_client_duration_ns: crate::INVALID_TIME,
        }
    }

    /// Typed accessor for the census carried by a registration-complete
    /// notification.
    pub fn node_count(&self) -> i16 {
        self.tick_id as i16
    }
}

/// Cartesian position in the simulator's world frame (meters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Pose of an actor or waypoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Location,
    pub rotation: Rotation,
}

/// Velocity vector (m/s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Lane maneuver hint attached to a planned waypoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoadOption {
    #[default]
    LaneFollow,
    Straight,
    Left,
    Right,
    ChangeLaneLeft,
    ChangeLaneRight,
}

/// One planned waypoint pushed down to a vehicle in edge mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub transform: Transform,
    pub road_option: RoadOption,
}

/// The ordered waypoint plan for a single vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaypointBuffer {
    pub vehicle_index: VehicleIndex,
    pub waypoint_buffer: Vec<Waypoint>,
}

impl WaypointBuffer {
    /// Empty plan for a vehicle with no pending waypoints.
    pub fn empty(vehicle_index: VehicleIndex) -> Self {
        Self {
            vehicle_index,
            waypoint_buffer: Vec::new(),
        }
    }
}

/// Edge-mode plan for the whole fleet, replaced wholesale before each tick
/// that needs edge routing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeWaypoints {
    pub all_waypoint_buffers: Vec<WaypointBuffer>,
}

/// Pull request for a vehicle's pending waypoint plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaypointRequest {
    pub vehicle_index: VehicleIndex,
}

/// Client-side step timing for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    pub tick_id: i32,
    pub client_start_ns: i64,
    pub client_end_ns: i64,
}

/// Localization debug series accumulated by a vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocDebugHelper {
    pub gnss_x: Vec<f64>,
    pub gnss_y: Vec<f64>,
    pub filter_x: Vec<f64>,
    pub filter_y: Vec<f64>,
}

/// Local-planner debug series accumulated by a vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanerDebugHelper {
    pub speed_list: Vec<f64>,
    pub acc_list: Vec<f64>,
    pub ttc_list: Vec<f64>,
}

/// Client-loop debug data: per-tick step timings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientDebugHelper {
    pub timestamps_list: Vec<Timestamps>,
}

/// Per-tick reply from a vehicle.
///
/// Kinematic state is populated only by the spectator and by every vehicle
/// in edge mode; debug sub-messages only on terminal/debug replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdate {
    pub vehicle_index: VehicleIndex,
    pub vehicle_state: Option<VehicleState>,
    pub tick_id: i32,
    pub duration_ns: i64,
    pub velocity: Option<Velocity>,
    pub transform: Option<Transform>,
    /// Sim-engine actor handle, set by phase-2 registration.
    pub actor_id: Option<u32>,
    /// Sim-engine vehicle UUID, set by phase-2 registration.
    pub vid: Option<String>,
    pub loc_debug_helper: Option<LocDebugHelper>,
    pub planer_debug_helper: Option<PlanerDebugHelper>,
    pub client_debug_helper: Option<ClientDebugHelper>,
}

impl VehicleUpdate {
    /// Reply stored for a phase-2 registration, carrying the actor binding.
    pub fn from_registration(info: &RegistrationInfo) -> Self {
        Self {
            vehicle_index: info.vehicle_index,
            vehicle_state: Some(VehicleState::CarlaUpdate),
            actor_id: Some(info.actor_id),
            vid: Some(info.vid.clone()),
            ..Default::default()
        }
    }
}

/// Registration request, both phases.
///
/// Phase 1 (`Registering`) populates the endpoint fields; phase 2
/// (`CarlaUpdate`) populates `vehicle_index`, `actor_id`, and `vid`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub vehicle_state: Option<VehicleState>,
    pub vehicle_ip: String,
    pub vehicle_port: u16,
    pub container_name: String,
    pub vehicle_index: VehicleIndex,
    pub actor_id: u32,
    pub vid: String,
}

/// Scenario description exchanged with the API host and vehicles.
///
/// `vehicle_index` is dual-use on the wire: the car count on
/// `Server_StartScenario`, the assigned index on registration replies. Use
/// the typed accessors instead of the raw field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationInfo {
    pub vehicle_index: VehicleIndex,
    pub test_scenario: String,
    pub application: String,
    pub version: String,
    pub is_edge: bool,
}

impl SimulationInfo {
    /// The fleet size requested by `Server_StartScenario`.
    pub fn car_count(&self) -> VehicleIndex {
        self.vehicle_index
    }

    /// The index assigned by a registration reply.
    pub fn assigned_index(&self) -> VehicleIndex {
        self.vehicle_index
    }
}

/// Batched drain response for `Server_GetVehicleUpdates`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub updates: Vec<VehicleUpdate>,
}
