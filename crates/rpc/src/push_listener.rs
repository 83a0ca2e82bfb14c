//! PushListener - client-side receiver for coordinator pushes.

use std::net::SocketAddr;

use contracts::wire::{read_frame, write_frame, Frame, OpCode, Status};
use contracts::{Empty, Tick};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::RpcError;

/// Listens for `PushTick` notifications from the coordinator and yields
/// them in arrival order.
///
/// Vehicle processes bind one of these on their announced push port; the
/// API host binds one on the configured push API port.
pub struct PushListener {
    local_addr: SocketAddr,
    rx: mpsc::UnboundedReceiver<Tick>,
    accept_task: JoinHandle<()>,
}

impl PushListener {
    /// Bind a listener; use port 0 for an ephemeral port.
    pub async fn bind(addr: &str) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(accept_loop(listener, tx));
        debug!(addr = %local_addr, "push listener bound");

        Ok(Self {
            local_addr,
            rx,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next pushed tick; `None` after shutdown.
    pub async fn recv(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }

    /// Non-blocking variant for assertions on already-delivered pushes.
    pub fn try_recv(&mut self) -> Option<Tick> {
        self.rx.try_recv().ok()
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::UnboundedSender<Tick>) {
    loop {
        let Ok((mut stream, peer)) = listener.accept().await else {
            return;
        };
        debug!(peer = %peer, "push connection accepted");

        let tx = tx.clone();
        tokio::spawn(async move {
            while let Ok(frame) = read_frame(&mut stream).await {
                let response = match frame.op {
                    OpCode::PushTick => match frame.decode_body::<Tick>() {
                        Ok(tick) => {
                            if tx.send(tick).is_err() {
                                return;
                            }
                            match Frame::response(OpCode::PushTick, &Empty {}) {
                                Ok(ok) => ok,
                                Err(_) => Frame::error(OpCode::PushTick, Status::Internal),
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "malformed push");
                            Frame::error(OpCode::PushTick, Status::InvalidArgument)
                        }
                    },
                    OpCode::Ping => Frame::control(OpCode::Pong),
                    op => {
                        warn!(op = ?op, "unexpected operation on push connection");
                        Frame::error(op, Status::InvalidArgument)
                    }
                };

                if write_frame(&mut stream, &response).await.is_err() {
                    return;
                }
            }
        });
    }
}
