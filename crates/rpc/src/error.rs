//! RPC error types and the barrier-to-status mapping.

use barrier::BarrierError;
use contracts::wire::{OpCode, Status};
use thiserror::Error;

/// RPC-layer errors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire codec failure
    #[error("wire error: {0}")]
    Wire(#[from] contracts::CoordError),

    /// Server answered a call with a non-ok status
    #[error("{op:?} failed with status: {status}")]
    Status { op: OpCode, status: Status },

    /// Server answered with a different opcode than the call
    #[error("expected {expected:?} response, got {got:?}")]
    OpMismatch { expected: OpCode, got: OpCode },

    /// Coordination-core rejection
    #[error(transparent)]
    Barrier(#[from] BarrierError),
}

impl RpcError {
    /// Wire status for an error raised while handling a request.
    pub fn status(&self) -> Status {
        match self {
            RpcError::Barrier(BarrierError::InvalidState { .. }) => Status::FailedPrecondition,
            RpcError::Barrier(BarrierError::CapacityExceeded { .. }) => Status::ResourceExhausted,
            RpcError::Barrier(
                BarrierError::TickMismatch { .. }
                | BarrierError::UnexpectedVehicleState { .. }
                | BarrierError::UnknownVehicle { .. },
            ) => Status::InvalidArgument,
            RpcError::Wire(_) => Status::InvalidArgument,
            _ => Status::Internal,
        }
    }
}
