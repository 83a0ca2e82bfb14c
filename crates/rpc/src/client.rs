//! CoordClient - typed caller for the coordinator's operations.

use contracts::wire::{read_frame, write_frame, Frame, OpCode};
use contracts::{
    EdgeWaypoints, Empty, RegistrationInfo, SimulationInfo, Tick, UpdateBatch, VehicleIndex,
    VehicleUpdate, WaypointBuffer, WaypointRequest,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpStream;
use tracing::debug;

use crate::RpcError;

/// One connection to the coordinator, used by vehicle processes and by the
/// simulation API host. All operations are unary.
pub struct CoordClient {
    stream: TcpStream,
}

impl CoordClient {
    pub async fn connect(addr: &str) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(addr = %addr, "connected to coordinator");
        Ok(Self { stream })
    }

    /// Two-phase registration; the reply carries the assigned index (phase
    /// 1, plus the scenario config) or echoes the index (phase 2).
    pub async fn register_vehicle(
        &mut self,
        request: &RegistrationInfo,
    ) -> Result<SimulationInfo, RpcError> {
        self.call(OpCode::RegisterVehicle, request).await
    }

    /// Per-tick reply.
    pub async fn send_update(&mut self, update: &VehicleUpdate) -> Result<(), RpcError> {
        let Empty {} = self.call(OpCode::SendUpdate, update).await?;
        Ok(())
    }

    /// Edge-mode waypoint pull.
    pub async fn get_waypoints(
        &mut self,
        vehicle_index: VehicleIndex,
    ) -> Result<WaypointBuffer, RpcError> {
        self.call(OpCode::GetWaypoints, &WaypointRequest { vehicle_index })
            .await
    }

    /// Advance the world clock.
    pub async fn do_tick(&mut self, tick: &Tick) -> Result<(), RpcError> {
        let Empty {} = self.call(OpCode::DoTick, tick).await?;
        Ok(())
    }

    /// Drain one batch of pending vehicle updates.
    pub async fn get_vehicle_updates(&mut self) -> Result<UpdateBatch, RpcError> {
        self.call(OpCode::GetVehicleUpdates, &Empty {}).await
    }

    /// Begin a scenario (`vehicle_index` carries the car count).
    pub async fn start_scenario(&mut self, info: &SimulationInfo) -> Result<(), RpcError> {
        let Empty {} = self.call(OpCode::StartScenario, info).await?;
        Ok(())
    }

    /// Terminate the running scenario.
    pub async fn end_scenario(&mut self) -> Result<(), RpcError> {
        let Empty {} = self.call(OpCode::EndScenario, &Empty {}).await?;
        Ok(())
    }

    /// Replace the edge waypoint table.
    pub async fn push_edge_waypoints(
        &mut self,
        waypoints: &EdgeWaypoints,
    ) -> Result<(), RpcError> {
        let Empty {} = self.call(OpCode::PushEdgeWaypoints, waypoints).await?;
        Ok(())
    }

    /// Issue one unary call, transparently answering keepalive pings that
    /// arrive while waiting.
    async fn call<Req, Resp>(&mut self, op: OpCode, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        write_frame(&mut self.stream, &Frame::request(op, request)?).await?;

        loop {
            let frame = read_frame(&mut self.stream).await?;
            match frame.op {
                OpCode::Ping => {
                    write_frame(&mut self.stream, &Frame::control(OpCode::Pong)).await?;
                }
                got if got == op => {
                    if !frame.status.is_ok() {
                        return Err(RpcError::Status {
                            op,
                            status: frame.status,
                        });
                    }
                    return Ok(frame.decode_body()?);
                }
                got => {
                    return Err(RpcError::OpMismatch {
                        expected: op,
                        got,
                    });
                }
            }
        }
    }
}
