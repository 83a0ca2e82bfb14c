//! Push error types.

use contracts::wire::Status;
use thiserror::Error;

/// Push-path errors; callers treat pushes as best-effort and only log these.
#[derive(Debug, Error)]
pub enum PushError {
    /// Connection failed or dropped mid-call
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire codec failure
    #[error("wire error: {0}")]
    Wire(#[from] contracts::CoordError),

    /// Peer answered with a non-ok status
    #[error("push rejected with status: {status}")]
    Rejected { status: Status },
}
