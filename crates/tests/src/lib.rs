//! # Integration Tests
//!
//! End-to-end tests over loopback TCP: a real coordinator server, stub
//! vehicle processes (each with its own push listener and client
//! connection), and a stub simulation API host.

#[cfg(test)]
mod e2e_tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        ClientDebugHelper, Command, EdgeWaypoints, LocDebugHelper, Location, PlanerDebugHelper,
        RegistrationInfo, ServerConfig, SimulationInfo, Tick, Timestamps, Transform, VehicleState,
        VehicleUpdate, Velocity, Waypoint, WaypointBuffer,
    };
    use observability::{ScenarioStatsAggregator, TickStats};
    use rpc::{CoordClient, CoordServer, CoordService, PushListener};

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    /// Stub simulation API host: drives the scenario and receives the
    /// coordinator's upstream pushes.
    struct ApiHost {
        client: CoordClient,
        pushes: PushListener,
    }

    /// Stub vehicle process: registers, receives tick pushes, replies.
    struct Vehicle {
        index: i16,
        client: CoordClient,
        pushes: PushListener,
    }

    async fn recv_push(listener: &mut PushListener) -> Tick {
        tokio::time::timeout(RECV_TIMEOUT, listener.recv())
            .await
            .expect("push expected")
            .expect("push listener closed")
    }

    /// Boot a coordinator wired to a fresh API-host stub.
    async fn boot(update_batch_size: u16) -> (SocketAddr, ApiHost, Arc<CoordService>) {
        let api_pushes = PushListener::bind("127.0.0.1:0").await.unwrap();

        let config = ServerConfig {
            push_api_port: api_pushes.local_addr().port(),
            api_host: "127.0.0.1".to_string(),
            update_batch_size,
            ..Default::default()
        };

        let service = CoordService::new(config);
        let server = CoordServer::bind_addr(Arc::clone(&service), "127.0.0.1:0")
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let client = CoordClient::connect(&addr.to_string()).await.unwrap();
        let api = ApiHost {
            client,
            pushes: api_pushes,
        };
        (addr, api, service)
    }

    fn start_request(num_cars: i16, is_edge: bool) -> SimulationInfo {
        SimulationInfo {
            vehicle_index: num_cars,
            test_scenario: "s.yaml".to_string(),
            application: "a".to_string(),
            version: "v".to_string(),
            is_edge,
        }
    }

    /// Complete both registration phases for one vehicle.
    async fn register(coord: SocketAddr, container: &str) -> Vehicle {
        let pushes = PushListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = CoordClient::connect(&coord.to_string()).await.unwrap();

        let reply = client
            .register_vehicle(&RegistrationInfo {
                vehicle_state: Some(VehicleState::Registering),
                vehicle_ip: "127.0.0.1".to_string(),
                vehicle_port: pushes.local_addr().port(),
                container_name: container.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let index = reply.assigned_index();
        assert_eq!(reply.test_scenario, "s.yaml");

        let mut vehicle = Vehicle {
            index,
            client,
            pushes,
        };
        vehicle.bind_actor().await;
        vehicle
    }

    impl Vehicle {
        /// Phase 2: report the spawned sim-engine actor.
        async fn bind_actor(&mut self) {
            let echo = self
                .client
                .register_vehicle(&RegistrationInfo {
                    vehicle_state: Some(VehicleState::CarlaUpdate),
                    vehicle_index: self.index,
                    actor_id: 1000 + self.index as u32,
                    vid: format!("vid-{}", self.index),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(echo.assigned_index(), self.index);
        }

        async fn reply(&mut self, state: VehicleState, tick_id: i32, duration_ns: i64) {
            self.client
                .send_update(&VehicleUpdate {
                    vehicle_index: self.index,
                    vehicle_state: Some(state),
                    tick_id,
                    duration_ns,
                    ..Default::default()
                })
                .await
                .unwrap();
        }
    }

    /// S1 - two-vehicle non-edge tick: census, fan-out, barrier closure,
    /// spectator-only drain.
    #[tokio::test]
    async fn s1_two_vehicle_non_edge_tick() {
        let (coord, mut api, _service) = boot(32).await;

        api.client.start_scenario(&start_request(2, false)).await.unwrap();

        let mut v0 = register(coord, "veh-0").await;
        let mut v1 = register(coord, "veh-1").await;
        assert_eq!(v0.index, 0);
        assert_eq!(v1.index, 1);

        // registration complete: node census in the tick_id field
        let census = recv_push(&mut api.pushes).await;
        assert_eq!(census.node_count(), 1);
        assert_eq!(census.command, Command::Tick);
        assert_eq!(census.last_client_duration_ns, 0);

        // registration data drains before the first tick
        let registration_data = api.client.get_vehicle_updates().await.unwrap();
        assert_eq!(registration_data.updates.len(), 2);
        assert_eq!(registration_data.updates[0].actor_id, Some(1000));

        // tick 1
        api.client
            .do_tick(&Tick::new(1, Command::Tick, 0))
            .await
            .unwrap();
        assert_eq!(recv_push(&mut v0.pushes).await.tick_id, 1);
        assert_eq!(recv_push(&mut v1.pushes).await.tick_id, 1);

        // the spectator reports its kinematic state with every TickOk
        v0.client
            .send_update(&VehicleUpdate {
                vehicle_index: v0.index,
                vehicle_state: Some(VehicleState::TickOk),
                tick_id: 1,
                duration_ns: 1000,
                velocity: Some(Velocity {
                    x: 4.2,
                    y: 0.0,
                    z: 0.0,
                }),
                transform: Some(Transform {
                    location: Location {
                        x: 120.0,
                        y: -4.0,
                        z: 0.3,
                    },
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        v1.reply(VehicleState::TickOk, 1, 1000).await;

        // barrier closed exactly once
        let completion = recv_push(&mut api.pushes).await;
        assert_eq!(completion.tick_id, 1);
        assert_eq!(completion.command, Command::Tick);
        assert_eq!(completion.last_client_duration_ns, 1000);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(api.pushes.try_recv().is_none());

        // non-edge drain: spectator only, index 1 skipped
        let batch = api.client.get_vehicle_updates().await.unwrap();
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].vehicle_index, 0);
        assert_eq!(batch.updates[0].velocity.unwrap().x, 4.2);
        assert_eq!(batch.updates[0].transform.unwrap().location.x, 120.0);

        // drain idempotence after empty
        let empty = api.client.get_vehicle_updates().await.unwrap();
        assert!(empty.updates.is_empty());
    }

    /// S2 - edge-mode waypoint delivery and full-fleet drain.
    #[tokio::test]
    async fn s2_edge_mode_waypoint_delivery() {
        let (coord, mut api, _service) = boot(32).await;

        api.client.start_scenario(&start_request(2, true)).await.unwrap();

        let mut v0 = register(coord, "veh-0").await;
        let mut v1 = register(coord, "veh-1").await;
        recv_push(&mut api.pushes).await;
        api.client.get_vehicle_updates().await.unwrap();

        let wp = |x: f64| Waypoint {
            transform: Transform {
                location: Location { x, y: 0.0, z: 0.0 },
                ..Default::default()
            },
            ..Default::default()
        };
        api.client
            .push_edge_waypoints(&EdgeWaypoints {
                all_waypoint_buffers: vec![
                    WaypointBuffer {
                        vehicle_index: 0,
                        waypoint_buffer: vec![wp(1.0)],
                    },
                    WaypointBuffer {
                        vehicle_index: 1,
                        waypoint_buffer: vec![wp(2.0), wp(3.0)],
                    },
                ],
            })
            .await
            .unwrap();

        let plan = v1.client.get_waypoints(1).await.unwrap();
        assert_eq!(plan.vehicle_index, 1);
        assert_eq!(plan.waypoint_buffer.len(), 2);
        assert_eq!(plan.waypoint_buffer[0].transform.location.x, 2.0);

        // no plan for an unknown index is empty, not an error
        let missing = v1.client.get_waypoints(2).await.unwrap();
        assert!(missing.waypoint_buffer.is_empty());

        api.client
            .do_tick(&Tick::new(1, Command::PullWaypointsAndTick, 0))
            .await
            .unwrap();
        assert_eq!(
            recv_push(&mut v0.pushes).await.command,
            Command::PullWaypointsAndTick
        );
        recv_push(&mut v1.pushes).await;

        v0.reply(VehicleState::TickOk, 1, 500).await;
        v1.reply(VehicleState::TickOk, 1, 800).await;
        recv_push(&mut api.pushes).await;

        // edge mode: every vehicle's reply drains
        let batch = api.client.get_vehicle_updates().await.unwrap();
        assert_eq!(batch.updates.len(), 2);
    }

    /// S3 - duplicate reply: a repeated TickOk double-counts and closes the
    /// barrier prematurely (known weakness, reproduced deliberately).
    #[tokio::test]
    async fn s3_duplicate_reply_closes_barrier_prematurely() {
        let (coord, mut api, _service) = boot(32).await;

        api.client.start_scenario(&start_request(2, false)).await.unwrap();
        let mut v0 = register(coord, "veh-0").await;
        let mut v1 = register(coord, "veh-1").await;
        recv_push(&mut api.pushes).await;
        api.client.get_vehicle_updates().await.unwrap();

        api.client.do_tick(&Tick::new(1, Command::Tick, 0)).await.unwrap();
        recv_push(&mut v0.pushes).await;
        recv_push(&mut v1.pushes).await;

        v0.reply(VehicleState::TickOk, 1, 100).await;
        v0.reply(VehicleState::TickOk, 1, 120).await;

        // vehicle 1 never replied, yet the barrier closed
        let premature = recv_push(&mut api.pushes).await;
        assert_eq!(premature.tick_id, 1);
    }

    /// S4 - a terminal vehicle keeps counting toward completeness.
    #[tokio::test]
    async fn s4_terminal_vehicle_persists_across_ticks() {
        let (coord, mut api, _service) = boot(32).await;

        api.client.start_scenario(&start_request(2, false)).await.unwrap();
        let mut v0 = register(coord, "veh-0").await;
        let mut v1 = register(coord, "veh-1").await;
        recv_push(&mut api.pushes).await;
        api.client.get_vehicle_updates().await.unwrap();

        api.client.do_tick(&Tick::new(1, Command::Tick, 0)).await.unwrap();
        recv_push(&mut v0.pushes).await;
        recv_push(&mut v1.pushes).await;
        v0.reply(VehicleState::TickOk, 1, 100).await;

        // the terminal reply carries the vehicle's debug payload
        v1.client
            .send_update(&VehicleUpdate {
                vehicle_index: v1.index,
                vehicle_state: Some(VehicleState::TickDone),
                tick_id: 1,
                duration_ns: 200,
                loc_debug_helper: Some(LocDebugHelper {
                    gnss_x: vec![12.5],
                    gnss_y: vec![-3.25],
                    ..Default::default()
                }),
                planer_debug_helper: Some(PlanerDebugHelper {
                    speed_list: vec![8.0, 7.5],
                    ..Default::default()
                }),
                client_debug_helper: Some(ClientDebugHelper {
                    timestamps_list: vec![Timestamps {
                        tick_id: 1,
                        client_start_ns: 10,
                        client_end_ns: 210,
                    }],
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(recv_push(&mut api.pushes).await.tick_id, 1);

        // terminal replies drain with their debug payload intact
        let batch = api.client.get_vehicle_updates().await.unwrap();
        let done = batch
            .updates
            .iter()
            .find(|u| u.vehicle_index == v1.index)
            .expect("terminal update expected");
        assert_eq!(done.vehicle_state, Some(VehicleState::TickDone));
        let loc = done.loc_debug_helper.as_ref().unwrap();
        assert_eq!(loc.gnss_x, vec![12.5]);
        let stamps = &done.client_debug_helper.as_ref().unwrap().timestamps_list;
        assert_eq!(stamps[0].client_end_ns, 210);

        // tick 2: only the spectator replies
        api.client.do_tick(&Tick::new(2, Command::Tick, 0)).await.unwrap();
        recv_push(&mut v0.pushes).await;
        v0.reply(VehicleState::TickOk, 2, 150).await;

        let completion = recv_push(&mut api.pushes).await;
        assert_eq!(completion.tick_id, 2);
        assert_eq!(completion.last_client_duration_ns, 150);
    }

    /// S5 - scenario end pushes END to every vehicle before returning.
    #[tokio::test]
    async fn s5_end_scenario_pushes_end_synchronously() {
        let (coord, mut api, _service) = boot(32).await;

        api.client.start_scenario(&start_request(2, false)).await.unwrap();
        let mut v0 = register(coord, "veh-0").await;
        let mut v1 = register(coord, "veh-1").await;
        recv_push(&mut api.pushes).await;

        api.client.end_scenario().await.unwrap();

        // both vehicles already hold the END once the call returns
        let end0 = v0.pushes.try_recv().expect("END expected for vehicle 0");
        let end1 = v1.pushes.try_recv().expect("END expected for vehicle 1");
        assert_eq!(end0.command, Command::End);
        assert_eq!(end0.tick_id, contracts::TICK_ID_INVALID);
        assert_eq!(end1.command, Command::End);
    }

    /// S6 - oversized drain: 100 vehicles, batch 32, four calls to wrap.
    #[tokio::test]
    async fn s6_oversized_drain_batches() {
        let (coord, mut api, _service) = boot(32).await;

        api.client.start_scenario(&start_request(100, false)).await.unwrap();

        // one connection stands in for all hundred containers
        let mut registrar = CoordClient::connect(&coord.to_string()).await.unwrap();
        for i in 0..100u16 {
            registrar
                .register_vehicle(&RegistrationInfo {
                    vehicle_state: Some(VehicleState::Registering),
                    vehicle_ip: "127.0.0.1".to_string(),
                    vehicle_port: 7000 + i,
                    container_name: format!("veh-{i}"),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        for i in 0..100i16 {
            registrar
                .register_vehicle(&RegistrationInfo {
                    vehicle_state: Some(VehicleState::CarlaUpdate),
                    vehicle_index: i,
                    actor_id: i as u32,
                    vid: format!("vid-{i}"),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        recv_push(&mut api.pushes).await;

        // indices 0-31, 32-63, 64-95, 96-99
        let mut sizes = Vec::new();
        loop {
            let batch = api.client.get_vehicle_updates().await.unwrap();
            if batch.updates.is_empty() {
                break;
            }
            sizes.push(batch.updates.len());
            if sizes.iter().sum::<usize>() == 100 {
                break;
            }
        }
        assert_eq!(sizes, vec![32, 32, 32, 4]);

        // the fourth call wrapped: a fresh drain starts at index 0 again
        let empty = api.client.get_vehicle_updates().await.unwrap();
        assert!(empty.updates.is_empty());
    }

    /// Scenario-reset law: a restart reproduces fresh-process behavior.
    #[tokio::test]
    async fn scenario_restart_behaves_like_fresh_process() {
        let (coord, mut api, _service) = boot(32).await;

        for round in 0..2 {
            api.client.start_scenario(&start_request(2, false)).await.unwrap();

            let mut v0 = register(coord, "veh-0").await;
            let mut v1 = register(coord, "veh-1").await;
            assert_eq!(v0.index, 0, "round {round}");
            assert_eq!(v1.index, 1, "round {round}");

            let census = recv_push(&mut api.pushes).await;
            assert_eq!(census.node_count(), 1);
            api.client.get_vehicle_updates().await.unwrap();

            api.client.do_tick(&Tick::new(1, Command::Tick, 0)).await.unwrap();
            recv_push(&mut v0.pushes).await;
            recv_push(&mut v1.pushes).await;
            v0.reply(VehicleState::TickOk, 1, 100).await;
            v1.reply(VehicleState::TickOk, 1, 100).await;
            assert_eq!(recv_push(&mut api.pushes).await.tick_id, 1);

            let batch = api.client.get_vehicle_updates().await.unwrap();
            assert_eq!(batch.updates.len(), 1, "round {round}");

            api.client.end_scenario().await.unwrap();
            assert_eq!(v0.pushes.try_recv().unwrap().command, Command::End);
            assert_eq!(v1.pushes.try_recv().unwrap().command, Command::End);
        }
    }

    /// Multi-tick run aggregating tail-latency statistics the way the API
    /// host evaluates a scenario.
    #[tokio::test]
    async fn multi_tick_run_aggregates_stats() {
        let (coord, mut api, service) = boot(32).await;

        api.client.start_scenario(&start_request(2, false)).await.unwrap();
        let mut v0 = register(coord, "veh-0").await;
        let mut v1 = register(coord, "veh-1").await;
        recv_push(&mut api.pushes).await;
        api.client.get_vehicle_updates().await.unwrap();

        let mut aggregator = ScenarioStatsAggregator::new();
        for tick_id in 1..=3 {
            api.client
                .do_tick(&Tick::new(tick_id, Command::Tick, 0))
                .await
                .unwrap();
            recv_push(&mut v0.pushes).await;
            recv_push(&mut v1.pushes).await;

            v0.reply(VehicleState::TickOk, tick_id, 1_000_000).await;
            v1.reply(VehicleState::TickOk, tick_id, 2_000_000).await;

            let completion = recv_push(&mut api.pushes).await;
            aggregator.update(&TickStats {
                tick_id: completion.tick_id,
                last_client_duration_ns: completion.last_client_duration_ns,
                replies: service.scenario().num_replied(),
                completions: service.scenario().num_completed(),
            });
            api.client.get_vehicle_updates().await.unwrap();
        }

        assert_eq!(aggregator.total_ticks, 3);
        let summary = aggregator.summary();
        assert_eq!(summary.count, 3);
        assert!((summary.mean - 2.0).abs() < 1e-9);
        assert_eq!(service.scenario().tick_id(), 3);
    }
}
