//! # Push Client
//!
//! Outbound RPC stubs owned by the coordinator: [`PushClient`] wraps one
//! framed TCP connection to a vehicle (or the API host) and issues unary
//! `PushTick` calls; [`PushFleet`] owns a worker task per registered vehicle
//! so that tick fan-out never blocks the tick handler.

mod client;
mod error;
mod fleet;

pub use client::PushClient;
pub use error::PushError;
pub use fleet::{PushFleet, PushHandle};
