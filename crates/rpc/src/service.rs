//! CoordService - the seven unary operations.

use std::sync::Arc;

use barrier::{RegistrationOutcome, Scenario};
use contracts::wire::{Frame, OpCode, Status};
use contracts::{
    EdgeWaypoints, Empty, RegistrationInfo, ScenarioConfig, ServerConfig, SimulationInfo, Tick,
    UpdateBatch, VehicleUpdate, WaypointBuffer, WaypointRequest,
};
use push_client::{PushClient, PushFleet};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::RpcError;

/// The coordinator service: one [`Scenario`] value, the vehicle push fleet,
/// and the upstream API push client (which outlives scenarios).
pub struct CoordService {
    config: ServerConfig,
    scenario: Scenario,
    fleet: Mutex<PushFleet>,
    api_client: Mutex<PushClient>,
}

impl CoordService {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let fleet = PushFleet::new(config.push_queue_capacity as usize);
        let api_client = PushClient::new(config.api_push_addr());

        Arc::new(Self {
            config,
            scenario: Scenario::new(),
            fleet: Mutex::new(fleet),
            api_client: Mutex::new(api_client),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Route one request frame to its handler and build the response frame.
    ///
    /// Handler rejections become error statuses; the connection itself only
    /// fails on transport errors.
    pub async fn dispatch(&self, frame: Frame) -> Frame {
        let op = frame.op;
        let result = match op {
            OpCode::RegisterVehicle => self.handle(frame, |req| self.register_vehicle(req)).await,
            OpCode::SendUpdate => self.handle(frame, |req| self.send_update(req)).await,
            OpCode::GetWaypoints => self.handle(frame, |req| self.get_waypoints(req)).await,
            OpCode::DoTick => self.handle(frame, |req| self.do_tick(req)).await,
            OpCode::GetVehicleUpdates => {
                self.handle(frame, |req| self.get_vehicle_updates(req)).await
            }
            OpCode::StartScenario => self.handle(frame, |req| self.start_scenario(req)).await,
            OpCode::EndScenario => self.handle(frame, |req| self.end_scenario(req)).await,
            OpCode::PushEdgeWaypoints => {
                self.handle(frame, |req| self.push_edge_waypoints(req)).await
            }
            // pushes and pings are not server operations
            OpCode::PushTick | OpCode::Ping | OpCode::Pong => {
                warn!(op = ?op, "unexpected inbound operation");
                return Frame::error(op, Status::InvalidArgument);
            }
        };

        match result {
            Ok(frame) => frame,
            Err(e) => {
                let status = e.status();
                error!(op = ?op, status = %status, error = %e, "request failed");
                Frame::error(op, status)
            }
        }
    }

    async fn handle<Req, Resp, F, Fut>(&self, frame: Frame, f: F) -> Result<Frame, RpcError>
    where
        Req: serde::de::DeserializeOwned,
        Resp: serde::Serialize,
        F: FnOnce(Req) -> Fut,
        Fut: std::future::Future<Output = Result<Resp, RpcError>>,
    {
        let request: Req = frame.decode_body()?;
        let response = f(request).await?;
        Ok(Frame::response(frame.op, &response)?)
    }

    /// `Client_RegisterVehicle`: two-phase registration.
    #[instrument(name = "rpc_register_vehicle", skip_all)]
    async fn register_vehicle(
        &self,
        request: RegistrationInfo,
    ) -> Result<SimulationInfo, RpcError> {
        match self.scenario.register_vehicle(&request)? {
            RegistrationOutcome::Assigned {
                entry,
                reply,
                new_node,
            } => {
                info!(
                    index = entry.index,
                    container = %entry.container_name,
                    peer = %entry.push_addr(),
                    "vehicle assigned"
                );
                observability::record_registration(entry.index, new_node);
                self.fleet.lock().await.add(entry.index, entry.push_addr());
                Ok(reply)
            }
            RegistrationOutcome::Bound { index, census } => {
                if let Some(tick) = census {
                    info!(nodes = tick.node_count(), "registration complete, notifying api host");
                    self.api_client.lock().await.push_tick(&tick).await;
                }
                Ok(SimulationInfo {
                    vehicle_index: index,
                    ..Default::default()
                })
            }
        }
    }

    /// `Client_SendUpdate`: per-tick reply; a closing barrier pushes the
    /// completion upstream.
    #[instrument(name = "rpc_send_update", skip_all)]
    async fn send_update(&self, request: VehicleUpdate) -> Result<Empty, RpcError> {
        let outcome = self.scenario.handle_update(&request)?;

        debug!(
            index = request.vehicle_index,
            tick_id = request.tick_id,
            stored = outcome.stored,
            "update received"
        );

        if let Some(completion) = outcome.completion {
            observability::record_barrier_closed(&observability::TickStats {
                tick_id: completion.tick.tick_id,
                last_client_duration_ns: completion.tick.last_client_duration_ns,
                replies: self.scenario.num_replied(),
                completions: self.scenario.num_completed(),
            });
            // best-effort: a failed upstream push is logged by the client
            self.api_client.lock().await.push_tick(&completion.tick).await;
        }
        Ok(Empty {})
    }

    /// `Client_GetWaypoints`: edge-mode pull.
    #[instrument(name = "rpc_get_waypoints", skip_all)]
    async fn get_waypoints(&self, request: WaypointRequest) -> Result<WaypointBuffer, RpcError> {
        Ok(self.scenario.waypoints_for(request.vehicle_index)?)
    }

    /// `Server_DoTick`: advance the clock and fan out.
    #[instrument(name = "rpc_do_tick", skip_all)]
    async fn do_tick(&self, request: Tick) -> Result<Empty, RpcError> {
        let fanout = self.scenario.begin_tick(&request)?;
        self.fleet.lock().await.broadcast(&fanout);
        Ok(Empty {})
    }

    /// `Server_GetVehicleUpdates`: batched drain.
    #[instrument(name = "rpc_get_vehicle_updates", skip_all)]
    async fn get_vehicle_updates(&self, _request: Empty) -> Result<UpdateBatch, RpcError> {
        let outcome = self
            .scenario
            .drain_updates(self.config.update_batch_size)?;
        observability::record_drain_batch(outcome.updates.len(), outcome.wrapped);
        Ok(UpdateBatch {
            updates: outcome.updates,
        })
    }

    /// `Server_PushEdgeWaypoints`: replace the relay table.
    #[instrument(name = "rpc_push_edge_waypoints", skip_all)]
    async fn push_edge_waypoints(&self, request: EdgeWaypoints) -> Result<Empty, RpcError> {
        self.scenario.push_edge_waypoints(&request)?;
        Ok(Empty {})
    }

    /// `Server_StartScenario`: begin a new scenario.
    #[instrument(name = "rpc_start_scenario", skip_all)]
    async fn start_scenario(&self, request: SimulationInfo) -> Result<Empty, RpcError> {
        let config = ScenarioConfig::from_start_request(&request);

        // Hold the fleet lock across the state flip: registrations reopened
        // by `start` block on this lock, so the clear cannot wipe a handle
        // added for the new scenario.
        let mut fleet = self.fleet.lock().await;
        self.scenario.start(config)?;
        fleet.clear().await;
        Ok(Empty {})
    }

    /// `Server_EndScenario`: terminate and push END to every vehicle, in
    /// order, before replying.
    #[instrument(name = "rpc_end_scenario", skip_all)]
    async fn end_scenario(&self, _request: Empty) -> Result<Empty, RpcError> {
        self.scenario.end()?;
        self.fleet.lock().await.broadcast_end().await;
        Ok(Empty {})
    }
}
