//! # RPC
//!
//! The coordinator's RPC surface over the framed TCP transport:
//!
//! - [`CoordServer`] - accept loop and per-connection keepalive
//! - [`CoordService`] - the seven unary operations wired to the barrier core
//!   and the push fleet
//! - [`CoordClient`] - typed caller used by the API host and vehicle
//!   processes
//! - [`PushListener`] - client-side receiver for server-initiated
//!   `PushTick` notifications

mod client;
mod error;
mod push_listener;
mod server;
mod service;

pub use client::CoordClient;
pub use error::RpcError;
pub use push_listener::PushListener;
pub use server::CoordServer;
pub use service::CoordService;
