//! CoordServer - accept loop and per-connection keepalive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use contracts::wire::{read_frame, write_frame, Frame, OpCode};
use contracts::KeepaliveConfig;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};

use crate::{CoordService, RpcError};

/// The coordinator's listening server.
///
/// Each accepted connection gets its own task running a read-dispatch-write
/// loop. Keepalive pings fire only on idle connections; a peer that misses
/// the pong deadline, or pings faster than the configured floor, is
/// disconnected.
pub struct CoordServer {
    listener: TcpListener,
    service: Arc<CoordService>,
}

impl CoordServer {
    /// Bind the configured port.
    ///
    /// A bind failure is fatal to the process (non-zero exit).
    pub async fn bind(service: Arc<CoordService>) -> Result<Self, RpcError> {
        let addr = format!("0.0.0.0:{}", service.config().port);
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "server listening");
        Ok(Self { listener, service })
    }

    /// Bind an explicit address (tests use an ephemeral port).
    pub async fn bind_addr(service: Arc<CoordService>, addr: &str) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) -> Result<(), RpcError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(peer = %peer, "connection accepted");

            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                let keepalive = service.config().keepalive.clone();
                if let Err(e) = handle_connection(service, stream, keepalive).await {
                    debug!(peer = %peer, error = %e, "connection closed");
                }
            });
        }
    }
}

/// Per-connection loop.
///
/// Pings fire only when the connection is idle for the keepalive interval;
/// a frame arriving mid-wait counts as liveness. The inbound ping floor
/// guards against keepalive floods.
#[instrument(name = "server_connection", skip_all)]
async fn handle_connection(
    service: Arc<CoordService>,
    mut stream: TcpStream,
    keepalive: KeepaliveConfig,
) -> Result<(), RpcError> {
    let mut last_inbound_ping: Option<Instant> = None;

    loop {
        let frame = if keepalive.permit_without_calls {
            match tokio::time::timeout(keepalive.interval(), read_frame(&mut stream)).await {
                Ok(read) => read?,
                Err(_) => {
                    // idle: ping and wait for any frame within the timeout
                    write_frame(&mut stream, &Frame::control(OpCode::Ping)).await?;
                    match tokio::time::timeout(keepalive.timeout(), read_frame(&mut stream)).await
                    {
                        Ok(read) => read?,
                        Err(_) => {
                            warn!("keepalive timeout, dropping connection");
                            return Ok(());
                        }
                    }
                }
            }
        } else {
            read_frame(&mut stream).await?
        };

        match frame.op {
            OpCode::Ping => {
                let now = Instant::now();
                if let Some(previous) = last_inbound_ping {
                    if now.duration_since(previous) < keepalive.min_recv_interval() {
                        warn!("inbound ping below minimum interval, dropping connection");
                        return Ok(());
                    }
                }
                last_inbound_ping = Some(now);
                write_frame(&mut stream, &Frame::control(OpCode::Pong)).await?;
            }
            OpCode::Pong => {
                // answer to our keepalive ping; nothing to do
            }
            _ => {
                let response = service.dispatch(frame).await;
                write_frame(&mut stream, &response).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::wire::Status;
    use contracts::{Command, ServerConfig, SimulationInfo, Tick};
    use crate::CoordClient;

    async fn spawn_server(config: ServerConfig) -> SocketAddr {
        let service = CoordService::new(config);
        let server = CoordServer::bind_addr(service, "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    fn start_request(num_cars: i16) -> SimulationInfo {
        SimulationInfo {
            vehicle_index: num_cars,
            test_scenario: "s.yaml".to_string(),
            application: "a".to_string(),
            version: "v".to_string(),
            is_edge: false,
        }
    }

    #[tokio::test]
    async fn restart_mid_run_is_rejected() {
        let addr = spawn_server(ServerConfig::default()).await;
        let mut client = CoordClient::connect(&addr.to_string()).await.unwrap();

        client.start_scenario(&start_request(2)).await.unwrap();

        let err = client.start_scenario(&start_request(2)).await.unwrap_err();
        match err {
            RpcError::Status { status, .. } => {
                assert_eq!(status, Status::FailedPrecondition)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tick_without_scenario_is_rejected() {
        let addr = spawn_server(ServerConfig::default()).await;
        let mut client = CoordClient::connect(&addr.to_string()).await.unwrap();

        let err = client
            .do_tick(&Tick::new(1, Command::Tick, 0))
            .await
            .unwrap_err();
        match err {
            RpcError::Status { status, .. } => {
                assert_eq!(status, Status::FailedPrecondition)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_fleet_is_rejected() {
        let addr = spawn_server(ServerConfig::default()).await;
        let mut client = CoordClient::connect(&addr.to_string()).await.unwrap();

        let err = client
            .start_scenario(&start_request(contracts::MAX_CARS + 1))
            .await
            .unwrap_err();
        match err {
            RpcError::Status { status, .. } => {
                assert_eq!(status, Status::ResourceExhausted)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rapid_inbound_pings_close_the_connection() {
        let addr = spawn_server(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        write_frame(&mut stream, &Frame::control(OpCode::Ping))
            .await
            .unwrap();
        let pong = read_frame(&mut stream).await.unwrap();
        assert_eq!(pong.op, OpCode::Pong);

        // second ping well below the 10 s floor
        write_frame(&mut stream, &Frame::control(OpCode::Ping))
            .await
            .unwrap();
        assert!(read_frame(&mut stream).await.is_err());
    }

    #[tokio::test]
    async fn idle_connection_receives_keepalive_ping() {
        let config = ServerConfig {
            keepalive: contracts::KeepaliveConfig {
                interval_secs: 1,
                timeout_secs: 20,
                ..Default::default()
            },
            ..Default::default()
        };
        let addr = spawn_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), read_frame(&mut stream))
            .await
            .expect("keepalive ping expected")
            .unwrap();
        assert_eq!(frame.op, OpCode::Ping);

        write_frame(&mut stream, &Frame::control(OpCode::Pong))
            .await
            .unwrap();
    }
}
