//! Scenario lifecycle and the tick-completion barrier.

use std::sync::atomic::{AtomicBool, AtomicI16, AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard};

use contracts::{
    wire, Command, EdgeWaypoints, RegistrationInfo, ScenarioConfig, SimulationInfo, Tick,
    VehicleIndex, VehicleState, VehicleUpdate, WaypointBuffer, MAX_CARS, SPECTATOR_INDEX,
    TICK_ID_INVALID,
};
use tracing::{debug, error, info, instrument, warn};

use crate::registry::{Registry, VehicleEntry};
use crate::replies::{DrainOutcome, PendingReplies, StoreOutcome};
use crate::waypoints::EdgeWaypointTable;
use crate::BarrierError;

/// Single-scenario lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    /// No scenario configured.
    Idle,
    /// Accepting vehicle registrations.
    Registering,
    /// Ticking.
    Running,
    /// Scenario terminated; a new one may start.
    Ended,
}

/// Result of a `Client_RegisterVehicle` call.
#[derive(Debug)]
pub enum RegistrationOutcome {
    /// Phase 1: index assigned. The caller must create the push stub for
    /// `entry` and send `reply` back to the vehicle.
    Assigned {
        entry: VehicleEntry,
        reply: SimulationInfo,
        /// The entry's host had not been seen before (node census grew).
        new_node: bool,
    },
    /// Phase 2: actor bound. When `census` is set, registration just
    /// completed and the tick must be pushed to the API host.
    Bound {
        index: VehicleIndex,
        census: Option<Tick>,
    },
}

/// The upstream notification produced by a closing barrier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickCompletion {
    pub tick: Tick,
}

/// Result of a `Client_SendUpdate` call.
#[derive(Debug)]
pub struct ReplyOutcome {
    /// The reply was written to its pending slot.
    pub stored: bool,
    /// The slot already held an undrained reply (logged, last writer wins).
    pub duplicate: bool,
    /// Set when this reply closed the barrier for the current tick.
    pub completion: Option<TickCompletion>,
}

#[derive(Debug)]
struct Inner {
    state: ScenarioState,
    config: Option<ScenarioConfig>,
    /// Last command relayed to vehicles; echoed in upstream notifications.
    command: Command,
    registry: Registry,
    waypoints: EdgeWaypointTable,
}

/// All coordination state for one scenario.
///
/// Hot counters are atomics mutated without the mutex; the registry and the
/// edge-waypoint table share one coarse mutex so that "assign index, record
/// node, add slot" is atomic. The pending-reply buffer carries per-slot
/// locks and is written concurrently by handler tasks.
#[derive(Debug)]
pub struct Scenario {
    tick_id: AtomicI32,
    /// Per-tick replies; reset on every `Server_DoTick` and on drain wrap.
    num_replied: AtomicI16,
    /// Scenario-lifetime completions; terminal vehicles keep counting
    /// toward the barrier on later ticks.
    num_completed: AtomicI16,
    /// First-closure guard for the current tick.
    barrier_closed: AtomicBool,
    inner: Mutex<Inner>,
    replies: PendingReplies,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    pub fn new() -> Self {
        Self {
            tick_id: AtomicI32::new(0),
            num_replied: AtomicI16::new(0),
            num_completed: AtomicI16::new(0),
            barrier_closed: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                state: ScenarioState::Idle,
                config: None,
                command: Command::Tick,
                registry: Registry::new(),
                waypoints: EdgeWaypointTable::new(),
            }),
            replies: PendingReplies::new(),
        }
    }

    /// `Server_StartScenario`: configure and enter `Registering`.
    ///
    /// Rejected unless the machine is `Idle` or `Ended`; a scenario cannot
    /// be restarted mid-run.
    #[instrument(name = "scenario_start", skip(self, config), fields(num_cars = config.num_cars, is_edge = config.is_edge))]
    pub fn start(&self, config: ScenarioConfig) -> Result<(), BarrierError> {
        let mut inner = self.lock_inner();

        match inner.state {
            ScenarioState::Idle | ScenarioState::Ended => {}
            state => {
                return Err(BarrierError::InvalidState {
                    state,
                    required: "Idle or Ended",
                })
            }
        }

        if config.num_cars < 1 || config.num_cars > MAX_CARS {
            return Err(BarrierError::CapacityExceeded {
                requested: config.num_cars,
                max: MAX_CARS,
            });
        }

        info!(
            num_cars = config.num_cars,
            is_edge = config.is_edge,
            application = %config.application,
            version = %config.version,
            "scenario starting"
        );

        inner.state = ScenarioState::Registering;
        inner.command = Command::Tick;
        inner.config = Some(config);
        inner.registry.clear();
        inner.waypoints.clear();

        self.replies.reset();
        self.tick_id.store(0, Ordering::SeqCst);
        self.num_replied.store(0, Ordering::SeqCst);
        self.num_completed.store(0, Ordering::SeqCst);
        self.barrier_closed.store(false, Ordering::SeqCst);

        metrics::counter!("fleet_coord_scenarios_total").increment(1);
        Ok(())
    }

    /// `Client_RegisterVehicle`, both phases.
    #[instrument(name = "scenario_register", skip(self, request), fields(state = ?request.vehicle_state))]
    pub fn register_vehicle(
        &self,
        request: &RegistrationInfo,
    ) -> Result<RegistrationOutcome, BarrierError> {
        match request.vehicle_state {
            Some(VehicleState::Registering) => self.register_phase_one(request),
            Some(VehicleState::CarlaUpdate) => self.register_phase_two(request),
            state => Err(BarrierError::UnexpectedVehicleState { state }),
        }
    }

    /// Phase 1: allocate the next index, record the node, add the slot.
    fn register_phase_one(
        &self,
        request: &RegistrationInfo,
    ) -> Result<RegistrationOutcome, BarrierError> {
        let mut inner = self.lock_inner();

        if inner.state != ScenarioState::Registering {
            return Err(BarrierError::InvalidState {
                state: inner.state,
                required: "Registering",
            });
        }
        let config = config_of(&inner)?;

        if inner.registry.len() >= config.num_cars {
            return Err(BarrierError::CapacityExceeded {
                requested: inner.registry.len() + 1,
                max: config.num_cars,
            });
        }

        let (entry, new_node) = inner.registry.add(
            request.vehicle_ip.clone(),
            request.vehicle_port,
            request.container_name.clone(),
        );
        self.replies.add_slot();

        debug!(
            index = entry.index,
            container = %entry.container_name,
            host = %entry.host,
            new_node,
            "vehicle registered"
        );

        let registered = inner.registry.len();
        if registered < config.num_cars {
            info!(registered, "received registrations");
        }

        let reply = config.registration_reply(entry.index);
        Ok(RegistrationOutcome::Assigned {
            entry,
            reply,
            new_node,
        })
    }

    /// Phase 2: bind the sim-engine actor and count the reply; the N-th
    /// binding completes registration and produces the census notification.
    fn register_phase_two(
        &self,
        request: &RegistrationInfo,
    ) -> Result<RegistrationOutcome, BarrierError> {
        let mut inner = self.lock_inner();

        if inner.state != ScenarioState::Registering {
            return Err(BarrierError::InvalidState {
                state: inner.state,
                required: "Registering",
            });
        }
        let config = config_of(&inner)?;

        let index = request.vehicle_index;
        if !inner.registry.contains(index) {
            return Err(BarrierError::UnknownVehicle {
                index,
                known: inner.registry.len(),
            });
        }

        debug!(
            index,
            actor_id = request.actor_id,
            vid = %request.vid,
            "actor binding received"
        );

        let update = VehicleUpdate::from_registration(request);
        let stored = self
            .replies
            .store_if_empty(index, wire::encode(&update)?)?;
        if stored {
            self.num_replied.fetch_add(1, Ordering::SeqCst);
        } else {
            warn!(index, "duplicate actor binding discarded");
        }

        let replies = self.num_replied.load(Ordering::SeqCst);
        let mut census = None;
        if inner.registry.len() == config.num_cars && replies == config.num_cars {
            info!(
                nodes = inner.registry.node_count(),
                cars = config.num_cars,
                "registration complete"
            );
            inner.state = ScenarioState::Running;
            census = Some(Tick::census(inner.registry.node_count(), inner.command));
        } else {
            info!(replies, "received replies");
        }

        Ok(RegistrationOutcome::Bound { index, census })
    }

    /// `Server_DoTick`: open the barrier for the next tick.
    ///
    /// Returns the tick to fan out to every vehicle. The tick id must be
    /// exactly `current + 1`; anything else is rejected with the state
    /// unchanged.
    #[instrument(name = "scenario_begin_tick", skip(self, request), fields(tick_id = request.tick_id))]
    pub fn begin_tick(&self, request: &Tick) -> Result<Tick, BarrierError> {
        let mut inner = self.lock_inner();

        if inner.state != ScenarioState::Running {
            return Err(BarrierError::InvalidState {
                state: inner.state,
                required: "Running",
            });
        }

        let current = self.tick_id.load(Ordering::SeqCst);
        if request.tick_id != current + 1 {
            return Err(BarrierError::TickMismatch {
                current,
                got: request.tick_id,
            });
        }

        self.num_replied.store(0, Ordering::SeqCst);
        self.barrier_closed.store(false, Ordering::SeqCst);
        inner.command = request.command;
        self.tick_id.store(request.tick_id, Ordering::SeqCst);

        debug!(tick_id = request.tick_id, command = ?request.command, "tick opened");
        metrics::counter!("fleet_coord_ticks_total").increment(1);

        Ok(Tick::new(
            request.tick_id,
            request.command,
            contracts::INVALID_TIME,
        ))
    }

    /// `Client_SendUpdate`: store per policy, count, and close the barrier
    /// when every vehicle has replied or terminated.
    #[instrument(
        name = "scenario_handle_update",
        skip(self, update),
        fields(index = update.vehicle_index, state = ?update.vehicle_state, tick_id = update.tick_id)
    )]
    pub fn handle_update(&self, update: &VehicleUpdate) -> Result<ReplyOutcome, BarrierError> {
        let state_tag = update
            .vehicle_state
            .ok_or(BarrierError::UnexpectedVehicleState { state: None })?;

        let (num_cars, is_edge, command) = {
            let inner = self.lock_inner();
            if inner.state != ScenarioState::Running {
                return Err(BarrierError::InvalidState {
                    state: inner.state,
                    required: "Running",
                });
            }
            let config = config_of(&inner)?;
            (config.num_cars, config.is_edge, inner.command)
        };

        let index = update.vehicle_index;
        if index < 0 || index >= self.replies.len() {
            return Err(BarrierError::UnknownVehicle {
                index,
                known: self.replies.len(),
            });
        }

        // registration tags have no business here; reject before any slot
        // write so a malformed update leaves no payload behind
        if !matches!(
            state_tag,
            VehicleState::TickOk
                | VehicleState::TickDone
                | VehicleState::DebugInfoUpdate
                | VehicleState::Error
        ) {
            return Err(BarrierError::UnexpectedVehicleState {
                state: Some(state_tag),
            });
        }

        // Storage policy: terminal and debug replies always propagate; TickOk
        // only in edge mode or from the spectator. The rest contribute to the
        // count but not to the payload.
        let store = is_edge || state_tag.is_terminal() || index == SPECTATOR_INDEX;
        let mut stored = false;
        let mut duplicate = !self.replies.is_slot_empty(index);
        if duplicate {
            error!(index, tick_id = update.tick_id, "reply overwrote an undrained slot");
        }
        if store {
            match self.replies.store(index, wire::encode(update)?)? {
                StoreOutcome::Stored => stored = true,
                StoreOutcome::Overwrote => {
                    stored = true;
                    duplicate = true;
                }
            }
        }

        if state_tag == VehicleState::TickOk {
            self.num_replied.fetch_add(1, Ordering::SeqCst);
        } else {
            self.num_completed.fetch_add(1, Ordering::SeqCst);
            debug!(index, state = ?state_tag, "vehicle completed");
        }
        metrics::counter!("fleet_coord_replies_total").increment(1);

        let replies = self.num_replied.load(Ordering::SeqCst);
        let completions = self.num_completed.load(Ordering::SeqCst);
        let complete = replies + completions == num_cars
            && self
                .barrier_closed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();

        let completion = complete.then(|| {
            info!(tick_id = update.tick_id, "tick complete");
            metrics::counter!("fleet_coord_barrier_closures_total").increment(1);
            metrics::histogram!("fleet_coord_last_client_duration_ns")
                .record(update.duration_ns as f64);
            TickCompletion {
                tick: Tick::new(update.tick_id, command, update.duration_ns),
            }
        });

        Ok(ReplyOutcome {
            stored,
            duplicate,
            completion,
        })
    }

    /// `Server_GetVehicleUpdates`: drain the next batch of pending replies.
    pub fn drain_updates(&self, batch_size: u16) -> Result<DrainOutcome, BarrierError> {
        let num_cars = {
            let inner = self.lock_inner();
            if inner.state == ScenarioState::Idle {
                return Err(BarrierError::InvalidState {
                    state: inner.state,
                    required: "an active scenario",
                });
            }
            config_of(&inner)?.num_cars
        };

        let outcome = self.replies.drain(num_cars, batch_size)?;
        if outcome.wrapped {
            self.num_replied.store(0, Ordering::SeqCst);
        }

        debug!(
            drained = outcome.updates.len(),
            wrapped = outcome.wrapped,
            "updates drained"
        );
        Ok(outcome)
    }

    /// `Server_PushEdgeWaypoints`: replace the relay table wholesale.
    pub fn push_edge_waypoints(&self, waypoints: &EdgeWaypoints) -> Result<(), BarrierError> {
        let mut inner = self.lock_inner();
        inner.waypoints.replace(waypoints)?;
        debug!(buffers = inner.waypoints.len(), "edge waypoints replaced");
        Ok(())
    }

    /// `Client_GetWaypoints`: fetch the pending plan for one vehicle.
    pub fn waypoints_for(&self, index: VehicleIndex) -> Result<WaypointBuffer, BarrierError> {
        let inner = self.lock_inner();
        inner.waypoints.lookup(index)
    }

    /// `Server_EndScenario`: terminate and produce the END push.
    #[instrument(name = "scenario_end", skip(self))]
    pub fn end(&self) -> Result<Tick, BarrierError> {
        let mut inner = self.lock_inner();

        if inner.state != ScenarioState::Running {
            return Err(BarrierError::InvalidState {
                state: inner.state,
                required: "Running",
            });
        }

        inner.command = Command::End;
        inner.state = ScenarioState::Ended;
        info!("scenario ended");

        Ok(Tick::new(TICK_ID_INVALID, Command::End, 0))
    }

    // ----- accessors -----

    pub fn state(&self) -> ScenarioState {
        self.lock_inner().state
    }

    pub fn tick_id(&self) -> i32 {
        self.tick_id.load(Ordering::SeqCst)
    }

    pub fn num_replied(&self) -> i16 {
        self.num_replied.load(Ordering::SeqCst)
    }

    pub fn num_completed(&self) -> i16 {
        self.num_completed.load(Ordering::SeqCst)
    }

    pub fn num_registered(&self) -> i16 {
        self.lock_inner().registry.len()
    }

    pub fn node_count(&self) -> i16 {
        self.lock_inner().registry.node_count()
    }

    pub fn config(&self) -> Option<ScenarioConfig> {
        self.lock_inner().config.clone()
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn config_of(inner: &Inner) -> Result<ScenarioConfig, BarrierError> {
    inner.config.clone().ok_or(BarrierError::InvalidState {
        state: inner.state,
        required: "a configured scenario",
    })
}
