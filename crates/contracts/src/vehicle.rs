//! Vehicle index space and the per-tick protocol tags.

use serde::{Deserialize, Serialize};

/// Index of a vehicle within one scenario.
///
/// Indices are dense from 0 and assigned in registration-arrival order.
pub type VehicleIndex = i16;

/// Upper bound on the fleet size for a single scenario.
pub const MAX_CARS: VehicleIndex = 512;

/// Index 0 is reserved for the spectator pseudo-vehicle, whose reply is
/// always propagated upstream even when bulk propagation is disabled.
pub const SPECTATOR_INDEX: VehicleIndex = 0;

/// Placeholder duration for pushes that carry no latency sample.
pub const INVALID_TIME: i64 = 0;

/// Tick id carried by out-of-band pushes (scenario end).
pub const TICK_ID_INVALID: i32 = -1;

/// Lifecycle tag carried by every vehicle-originated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleState {
    /// Phase-1 registration: requesting an index.
    Registering,
    /// Phase-2 registration: reporting the spawned sim-engine actor.
    CarlaUpdate,
    /// Per-tick reply: stepped successfully, more ticks expected.
    TickOk,
    /// Terminal reply: reached its destination, no further steps.
    TickDone,
    /// Terminal reply carrying the vehicle's debug payload.
    DebugInfoUpdate,
    /// Terminal reply: the vehicle failed and will not step again.
    Error,
}

impl VehicleState {
    /// Terminal states count toward scenario-lifetime completions rather
    /// than per-tick replies.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VehicleState::TickDone | VehicleState::DebugInfoUpdate | VehicleState::Error
        )
    }
}

/// Command tag carried by every outbound tick push.
///
/// Only `Tick` and `End` carry coordinator semantics; the remaining values
/// are relayed verbatim to vehicles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Advance the world clock by one step.
    #[default]
    Tick,
    /// Terminate the scenario.
    End,
    /// Step and reply with the full debug payload.
    RequestDebugInfo,
    /// Fetch pending edge waypoints before stepping.
    PullWaypointsAndTick,
}
