use std::time::Duration;

use tokio::time::timeout;
use traclink_client::loopback::{CommandLog, LoopbackConnector, SimulatorScript};
use traclink_client::{
    ClientError, Position, Session, SessionConfig, SessionState, VariableValue,
    VehicleTypeVariable, VehicleVariable,
};
use traclink_protocol::{command::ids, Command, EdgeWeight, ProtocolError};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

async fn connected(script: SimulatorScript) -> (Session, CommandLog) {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();

    let (connector, log) = LoopbackConnector::new(script);
    let mut session = Session::with_connector(SessionConfig::default(), connector);
    timeout(TEST_TIMEOUT, session.connect())
        .await
        .expect("connect timed out")
        .expect("connect failed");
    (session, log)
}

fn steps(commands: &[Command]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, Command::SimulationStep { .. }))
        .count()
}

#[tokio::test]
async fn test_advance_twenty_seconds() {
    let (mut session, mut log) = connected(SimulatorScript::new()).await;

    let executed = timeout(TEST_TIMEOUT, session.advance(20_000))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(executed, 20);
    assert_eq!(session.current_step(), Some(20));
    assert_eq!(steps(&log.drain()), 20);
}

#[tokio::test]
async fn test_advance_carries_remainder() {
    let (mut session, mut log) = connected(SimulatorScript::new()).await;

    assert_eq!(session.advance(5000).await.unwrap(), 5);
    assert_eq!(session.advance(500).await.unwrap(), 0);
    assert_eq!(session.accumulated_ms(), Some(5500));
    assert_eq!(session.current_step(), Some(5));

    assert_eq!(session.advance(500).await.unwrap(), 1);
    assert_eq!(session.current_step(), Some(6));
    assert_eq!(steps(&log.drain()), 6);
}

#[tokio::test]
async fn test_many_small_advances() {
    let (mut session, _log) = connected(SimulatorScript::new()).await;

    for _ in 0..40 {
        session.advance(250).await.unwrap();
        let step = session.current_step().unwrap();
        let accumulated = session.accumulated_ms().unwrap();
        assert!(accumulated >= step * 1000);
        assert_eq!(step, accumulated / 1000);
    }
    assert_eq!(session.current_step(), Some(10));
}

#[tokio::test]
async fn test_edge_list_after_end_simulation() {
    let script = SimulatorScript::new().with_edges(["e0", "e1", "e2"]);
    let (mut session, _log) = connected(script).await;

    assert_eq!(session.edge_list().await.unwrap(), vec!["e0", "e1", "e2"]);

    session.end_simulation().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.edge_list().await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(
        session.single_step().await,
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn test_override_fires_on_step_reaching_expiry() {
    let (mut session, mut log) = connected(SimulatorScript::new()).await;

    session.change_speed("veh0", 8.0, 2000).await.unwrap();
    let pending = session.pending_override("veh0").unwrap();
    assert_eq!(pending.expiry_ms, 2000);
    assert_eq!(pending.restore_speed, 8.0);

    session.advance(1000).await.unwrap();
    assert!(session.pending_override("veh0").is_some());

    session.advance(1000).await.unwrap();
    assert!(session.pending_override("veh0").is_none());

    let commands = log.drain();
    let reasserts: Vec<_> = commands
        .iter()
        .filter(|c| matches!(c, Command::SetSpeed { .. }))
        .collect();
    assert_eq!(
        reasserts,
        vec![&Command::SetSpeed {
            vehicle_id: "veh0".into(),
            speed: 8.0
        }]
    );
    // The reassertion follows the second step
    assert_eq!(
        commands.last(),
        Some(&Command::SetSpeed {
            vehicle_id: "veh0".into(),
            speed: 8.0
        })
    );
}

#[tokio::test]
async fn test_override_expires_mid_batch() {
    let (mut session, mut log) = connected(SimulatorScript::new()).await;

    session.advance(500).await.unwrap();
    // Expires at 2500: after the third step of the next batch
    session.change_speed("veh0", 3.0, 2000).await.unwrap();
    log.drain();

    session.advance(4000).await.unwrap();

    let commands = log.drain();
    let position = commands
        .iter()
        .position(|c| matches!(c, Command::SetSpeed { .. }))
        .unwrap();
    assert_eq!(steps(&commands[..position]), 3);
    assert_eq!(steps(&commands), 4);
}

#[tokio::test]
async fn test_resume_before_expiry_sends_no_reassert() {
    let (mut session, mut log) = connected(SimulatorScript::new()).await;

    session.change_speed("veh0", 8.0, 2000).await.unwrap();
    session.advance(1000).await.unwrap();
    session.resume("veh0").await.unwrap();
    assert!(session.pending_override("veh0").is_none());

    session.advance(5000).await.unwrap();

    let commands = log.drain();
    let speeds: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            Command::SetSpeed { speed, .. } => Some(*speed),
            _ => None,
        })
        .collect();
    assert_eq!(speeds, vec![-1.0]);
}

#[tokio::test]
async fn test_reapplied_override_replaces_previous() {
    let (mut session, mut log) = connected(SimulatorScript::new()).await;

    session.change_speed("veh0", 8.0, 2000).await.unwrap();
    session.change_speed("veh0", 4.0, 5000).await.unwrap();

    session.advance(3000).await.unwrap();
    assert_eq!(
        session.pending_override("veh0").map(|o| o.restore_speed),
        Some(4.0)
    );

    session.advance(2000).await.unwrap();
    let speeds: Vec<_> = log
        .drain()
        .into_iter()
        .filter_map(|c| match c {
            Command::SetSpeed { speed, .. } => Some(speed),
            _ => None,
        })
        .collect();
    assert_eq!(speeds, vec![4.0]);
}

#[tokio::test]
async fn test_rejected_speed_change_schedules_nothing() {
    let script = SimulatorScript::new().failing(
        ids::CMD_SET_VEHICLE_VARIABLE,
        Some(ids::CMD_SLOWDOWN),
        "Vehicle 'ghost' is not known",
    );
    let (mut session, _log) = connected(script).await;

    let result = session.change_speed("ghost", 8.0, 2000).await;
    match result {
        Err(ClientError::Simulator {
            command,
            description,
        }) => {
            assert_eq!(command, ids::CMD_SET_VEHICLE_VARIABLE);
            assert_eq!(description, "Vehicle 'ghost' is not known");
        }
        other => panic!("expected simulator error, got {other:?}"),
    }

    assert!(session.pending_override("ghost").is_none());
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_invalid_argument_sends_nothing() {
    let (mut session, mut log) = connected(SimulatorScript::new()).await;

    let result = session.change_speed("veh0", f64::NAN, 1000).await;
    assert!(matches!(
        result,
        Err(ClientError::Protocol(ProtocolError::InvalidArgument(_)))
    ));
    assert!(log.drain().is_empty());
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_queries() {
    let script = SimulatorScript::new()
        .with_route("route_0", ["e1", "e2", "e3"])
        .with_vehicle_type("passenger", VehicleTypeVariable::Length, 4.3)
        .with_vehicle_type("passenger", VehicleTypeVariable::MaxDecel, 7.5)
        .with_vehicle_variable(
            "veh0",
            VehicleVariable::RouteId,
            VariableValue::Str("route_0".into()),
        )
        .with_vehicle_variable("veh0", VehicleVariable::LaneIndex, VariableValue::Int(1))
        .with_origin(Position { x: 10.0, y: 20.0 })
        .with_version(21, "SUMO 1.20.0");
    let (mut session, _log) = connected(script).await;

    assert_eq!(
        session.route_edges("route_0").await.unwrap(),
        vec!["e1", "e2", "e3"]
    );
    assert_eq!(
        session
            .vehicle_type_property("passenger", VehicleTypeVariable::Length)
            .await
            .unwrap(),
        4.3
    );
    assert_eq!(
        session
            .vehicle_type_property("passenger", VehicleTypeVariable::MaxDecel)
            .await
            .unwrap(),
        7.5
    );
    assert_eq!(
        session
            .vehicle_variable("veh0", VehicleVariable::RouteId)
            .await
            .unwrap(),
        VariableValue::Str("route_0".into())
    );
    assert_eq!(
        session
            .vehicle_variable("veh0", VehicleVariable::LaneIndex)
            .await
            .unwrap()
            .as_int(),
        Some(1)
    );
    assert_eq!(
        session.convert_lon_lat(0.5, 0.25).await.unwrap(),
        Position { x: 510.0, y: 270.0 }
    );

    let version = session.get_version().await.unwrap();
    assert_eq!(version.api_version, 21);
    assert_eq!(version.software, "SUMO 1.20.0");
}

#[tokio::test]
async fn test_unknown_route_is_simulator_error() {
    let (mut session, _log) = connected(SimulatorScript::new()).await;

    let result = session.route_edges("nowhere").await;
    assert!(matches!(
        result,
        Err(ClientError::Simulator { ref description, .. }) if description.contains("nowhere")
    ));

    // The session stays usable
    assert_eq!(session.advance(1000).await.unwrap(), 1);
}

#[tokio::test]
async fn test_chunked_responses() {
    let script = SimulatorScript::new()
        .with_edges((0..200).map(|i| format!("edge_{i}")))
        .with_chunks(3);
    let (mut session, _log) = connected(script).await;

    let edges = session.edge_list().await.unwrap();
    assert_eq!(edges.len(), 200);
    assert_eq!(edges[199], "edge_199");

    assert_eq!(session.advance(3000).await.unwrap(), 3);
}

#[tokio::test]
async fn test_mismatched_status_keeps_session_usable() {
    // Well-framed reply echoing the wrong command id
    let reply = vec![0, 0, 0, 11, 7, 0x7F, 0x00, 0, 0, 0, 0];
    let script = SimulatorScript::new().with_raw_reply(ids::CMD_GET_EDGE_VARIABLE, reply);
    let (mut session, _log) = connected(script).await;

    assert!(matches!(
        session.edge_list().await,
        Err(ClientError::Protocol(ProtocolError::ProtocolMismatch {
            field: "status command",
            ..
        }))
    ));
    assert!(session.is_connected());
    assert_eq!(session.advance(1000).await.unwrap(), 1);
}

#[tokio::test]
async fn test_undecodable_reassert_keeps_later_overrides() {
    // Every set-speed gets a reply echoing the wrong command id
    let reply = vec![0, 0, 0, 11, 7, 0x7F, 0x00, 0, 0, 0, 0];
    let script = SimulatorScript::new().with_raw_variable_reply(
        ids::CMD_SET_VEHICLE_VARIABLE,
        ids::VAR_SPEED,
        reply,
    );
    let (mut session, mut log) = connected(script).await;

    session.change_speed("veh_a", 3.0, 500).await.unwrap();
    session.change_speed("veh_b", 4.0, 500).await.unwrap();
    log.drain();

    assert!(matches!(
        session.advance(1000).await,
        Err(ClientError::Protocol(ProtocolError::ProtocolMismatch { .. }))
    ));
    assert!(session.is_connected());
    assert!(session.pending_override("veh_a").is_none());
    assert!(session.pending_override("veh_b").is_some());
    assert_eq!(
        log.drain(),
        vec![
            Command::SimulationStep { target_time_ms: 0 },
            Command::SetSpeed {
                vehicle_id: "veh_a".into(),
                speed: 3.0
            },
        ]
    );

    // The next step picks up the override left behind
    assert!(session.advance(1000).await.is_err());
    assert!(session.pending_override("veh_b").is_none());
    assert_eq!(
        log.drain(),
        vec![
            Command::SimulationStep { target_time_ms: 0 },
            Command::SetSpeed {
                vehicle_id: "veh_b".into(),
                speed: 4.0
            },
        ]
    );
}

#[tokio::test]
async fn test_corrupted_length_prefix_closes_session() {
    let script = SimulatorScript::new().with_raw_reply(ids::CMD_GET_EDGE_VARIABLE, vec![0, 0, 0, 1]);
    let (mut session, _log) = connected(script).await;

    assert!(matches!(
        session.edge_list().await,
        Err(ClientError::CorruptedStream(_))
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.advance(1000).await,
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn test_network_edits() {
    let (mut session, mut log) = connected(SimulatorScript::new()).await;

    session
        .set_lane_allowed_classes("edge_1_0", &["bus"], true)
        .await
        .unwrap();
    session.block_edge("edge_1", EdgeWeight::TravelTime).await.unwrap();
    session
        .set_vehicle_type_class("passenger", "emergency")
        .await
        .unwrap();
    session
        .set_vehicle_type_imperfection("passenger", 0.0)
        .await
        .unwrap();
    session.set_max_speed("veh0", 20.0).await.unwrap();
    session
        .add_vehicle("veh9", "passenger", "route_0", 0, 0.0, 0.0, 0)
        .await
        .unwrap();
    session.add_stop("veh9", "edge_1", 15.0, 0, 10_000).await.unwrap();

    let commands = log.drain();
    assert_eq!(commands.len(), 7);
    assert_eq!(
        commands[1],
        Command::SetEdgeWeight {
            edge_id: "edge_1".into(),
            kind: EdgeWeight::TravelTime,
            begin_ms: 0,
            end_ms: 10_000,
            value: f64::MAX,
        }
    );
}

#[tokio::test]
async fn test_reconnect_after_end() {
    let (mut session, _log) = connected(SimulatorScript::new()).await;

    session.advance(3000).await.unwrap();
    session.end_simulation().await.unwrap();

    session.connect().await.unwrap();
    assert_eq!(session.current_step(), Some(0));
    assert_eq!(session.advance(1000).await.unwrap(), 1);
}

#[tokio::test]
async fn test_connect_timeout() {
    use async_trait::async_trait;
    use traclink_client::connector::{BoxedStream, Connector};

    struct Unresponsive;

    #[async_trait]
    impl Connector for Unresponsive {
        async fn connect(&self, _host: &str, _port: u16) -> std::io::Result<BoxedStream> {
            std::future::pending().await
        }
    }

    let config = SessionConfig {
        connect_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let mut session = Session::with_connector(config, Unresponsive);

    assert!(matches!(
        session.connect().await,
        Err(ClientError::ConnectTimeout { .. })
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_write_failure_disconnects_without_reading() {
    use async_trait::async_trait;
    use traclink_client::connector::{BoxedStream, Connector};

    /// Hands out a stream whose simulator side is already gone
    struct HungUp;

    #[async_trait]
    impl Connector for HungUp {
        async fn connect(&self, _host: &str, _port: u16) -> std::io::Result<BoxedStream> {
            let (client, server) = tokio::io::duplex(64);
            drop(server);
            Ok(Box::new(client))
        }
    }

    let mut session = Session::with_connector(SessionConfig::default(), HungUp);
    session.connect().await.unwrap();

    let result = timeout(TEST_TIMEOUT, session.edge_list()).await.unwrap();
    assert!(matches!(result, Err(ClientError::TransportWrite(_))));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.current_step(), None);

    assert!(matches!(
        session.advance(1000).await,
        Err(ClientError::NotConnected)
    ));
}
