//! Barrier error types.

use contracts::VehicleState;
use thiserror::Error;

use crate::ScenarioState;

/// Coordination-core errors; the RPC layer maps these to wire statuses.
#[derive(Debug, Error)]
pub enum BarrierError {
    /// Operation issued in the wrong lifecycle state
    #[error("scenario is {state:?}, operation requires {required}")]
    InvalidState {
        state: ScenarioState,
        required: &'static str,
    },

    /// Requested fleet size outside the supported range
    #[error("car count {requested} outside supported range 1..={max}")]
    CapacityExceeded { requested: i16, max: i16 },

    /// Tick id does not follow the current tick
    #[error("tick id {got} does not follow current tick {current}")]
    TickMismatch { current: i32, got: i32 },

    /// Registration carried an unexpected (or missing) vehicle state tag
    #[error("unexpected vehicle state {state:?} in registration")]
    UnexpectedVehicleState { state: Option<VehicleState> },

    /// Vehicle index outside the registered range
    #[error("vehicle index {index} out of range [0, {known})")]
    UnknownVehicle { index: i16, known: i16 },

    /// Stored bytes failed to (de)serialize
    #[error("codec error: {0}")]
    Codec(#[from] contracts::CoordError),
}
