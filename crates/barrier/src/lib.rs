//! # Barrier
//!
//! Transport-free coordination core: the scenario lifecycle state machine,
//! vehicle registry and node census, pending-reply buffer, edge-waypoint
//! table, and the tick-completion barrier itself.
//!
//! All scenario state lives in a single [`Scenario`] value. Hot counters are
//! atomics; structural mutations (registry growth, waypoint replacement) go
//! through one coarse mutex. Methods return typed outcomes describing the
//! pushes the caller must perform; this crate never touches the network.

mod error;
mod registry;
mod replies;
mod scenario;
mod waypoints;

pub use error::BarrierError;
pub use registry::{Registry, VehicleEntry};
pub use replies::{DrainOutcome, PendingReplies, StoreOutcome};
pub use scenario::{
    RegistrationOutcome, ReplyOutcome, Scenario, ScenarioState, TickCompletion,
};
pub use waypoints::EdgeWaypointTable;
