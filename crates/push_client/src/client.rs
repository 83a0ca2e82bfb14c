//! PushClient - one outbound stub, unary PushTick.

use contracts::wire::{read_frame, write_frame, Frame, OpCode};
use contracts::{Command, Empty, Tick};
use tokio::net::TcpStream;
use tracing::{debug, error, info, instrument};

use crate::PushError;

/// Outbound stub addressed to one vehicle or to the simulation API host.
///
/// The connection is opened lazily on the first push and dropped on any
/// failure so the next call reconnects. The caller sees a plain boolean:
/// pushes are best-effort and failures are only logged.
pub struct PushClient {
    connection: String,
    stream: Option<TcpStream>,
}

impl PushClient {
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            stream: None,
        }
    }

    /// Peer address this stub pushes to.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Send one tick notification and wait for the acknowledgement.
    #[instrument(
        name = "push_tick",
        skip(self, tick),
        fields(peer = %self.connection, tick_id = tick.tick_id)
    )]
    pub async fn push_tick(&mut self, tick: &Tick) -> bool {
        if tick.command == Command::End {
            info!(peer = %self.connection, "pushing END");
        }

        match self.try_push(tick).await {
            Ok(()) => true,
            Err(e) => {
                error!(peer = %self.connection, error = %e, "push failed");
                metrics::counter!("fleet_coord_push_failures_total").increment(1);
                // drop the stream; the next push reconnects
                self.stream = None;
                false
            }
        }
    }

    async fn try_push(&mut self, tick: &Tick) -> Result<(), PushError> {
        if self.stream.is_none() {
            let stream = TcpStream::connect(&self.connection).await?;
            debug!(peer = %self.connection, "push connection established");
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(PushError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "push stream unavailable",
            )));
        };

        write_frame(stream, &Frame::request(OpCode::PushTick, tick)?).await?;

        let reply = read_frame(stream).await?;
        if !reply.status.is_ok() {
            return Err(PushError::Rejected {
                status: reply.status,
            });
        }
        let Empty {} = reply.decode_body()?;
        Ok(())
    }
}
