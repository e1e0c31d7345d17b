//! In-process scripted simulator for tests
//!
//! The loopback simulator speaks the real wire format over an in-memory
//! duplex stream. It decodes every packet into a [`Command`], records it and
//! answers according to a [`SimulatorScript`]. Nothing leaves the process.
//!
//! # Example
//!
//! ```
//! use traclink_client::loopback::{LoopbackConnector, SimulatorScript};
//! use traclink_client::{Session, SessionConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let script = SimulatorScript::new().with_edges(["e0", "e1"]);
//! let (connector, mut log) = LoopbackConnector::new(script);
//!
//! let mut session = Session::with_connector(SessionConfig::default(), connector);
//! session.connect().await.unwrap();
//! assert_eq!(session.edge_list().await.unwrap(), vec!["e0", "e1"]);
//! assert_eq!(log.drain().len(), 1);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use traclink_protocol::command::ids;
use traclink_protocol::frame::{self, LENGTH_PREFIX_LEN};
use traclink_protocol::response::{self, ResultValue};
use traclink_protocol::{
    Command, Position, Status, VariableValue, VehicleTypeVariable, VehicleVariable, Version,
};

use crate::connector::{BoxedStream, Connector};

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Answers the loopback simulator gives
#[derive(Debug, Clone)]
pub struct SimulatorScript {
    version: Version,
    edges: Vec<String>,
    routes: HashMap<String, Vec<String>>,
    vehicle_types: HashMap<(String, VehicleTypeVariable), f64>,
    vehicle_variables: HashMap<(String, VehicleVariable), VariableValue>,
    origin: Position,
    failures: HashMap<(u8, Option<u8>), String>,
    raw_replies: HashMap<(u8, Option<u8>), Bytes>,
    chunks: usize,
}

impl Default for SimulatorScript {
    fn default() -> Self {
        Self {
            version: Version {
                api_version: 21,
                software: "loopback".to_string(),
            },
            edges: Vec::new(),
            routes: HashMap::new(),
            vehicle_types: HashMap::new(),
            vehicle_variables: HashMap::new(),
            origin: Position { x: 0.0, y: 0.0 },
            failures: HashMap::new(),
            raw_replies: HashMap::new(),
            chunks: 1,
        }
    }
}

impl SimulatorScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, api_version: i32, software: impl Into<String>) -> Self {
        self.version = Version {
            api_version,
            software: software.into(),
        };
        self
    }

    pub fn with_edges<I, S>(mut self, edges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edges = edges.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_route<I, S>(mut self, route_id: impl Into<String>, edges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes
            .insert(route_id.into(), edges.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_vehicle_type(
        mut self,
        vehicle_type: impl Into<String>,
        variable: VehicleTypeVariable,
        value: f64,
    ) -> Self {
        self.vehicle_types
            .insert((vehicle_type.into(), variable), value);
        self
    }

    pub fn with_vehicle_variable(
        mut self,
        vehicle_id: impl Into<String>,
        variable: VehicleVariable,
        value: VariableValue,
    ) -> Self {
        self.vehicle_variables
            .insert((vehicle_id.into(), variable), value);
        self
    }

    /// Conversions answer `origin + (lon, lat) * 1000`
    pub fn with_origin(mut self, origin: Position) -> Self {
        self.origin = origin;
        self
    }

    /// Rejects commands with `command_id`, narrowed to `variable` when given
    pub fn failing(
        mut self,
        command_id: u8,
        variable: Option<u8>,
        description: impl Into<String>,
    ) -> Self {
        self.failures
            .insert((command_id, variable), description.into());
        self
    }

    /// Answers commands with `command_id` with these exact bytes
    pub fn with_raw_reply(mut self, command_id: u8, reply: impl Into<Bytes>) -> Self {
        self.raw_replies.insert((command_id, None), reply.into());
        self
    }

    /// Like [`with_raw_reply`](Self::with_raw_reply), restricted to one variable
    pub fn with_raw_variable_reply(
        mut self,
        command_id: u8,
        variable: u8,
        reply: impl Into<Bytes>,
    ) -> Self {
        self.raw_replies
            .insert((command_id, Some(variable)), reply.into());
        self
    }

    /// Delivers every response split into `chunks` separate writes
    pub fn with_chunks(mut self, chunks: usize) -> Self {
        self.chunks = chunks.max(1);
        self
    }

    fn raw_reply(&self, command: &Command) -> Option<&Bytes> {
        self.raw_replies
            .get(&(command.id(), command.variable()))
            .or_else(|| self.raw_replies.get(&(command.id(), None)))
    }

    fn failure(&self, command: &Command) -> Option<&String> {
        self.failures
            .get(&(command.id(), command.variable()))
            .or_else(|| self.failures.get(&(command.id(), None)))
    }

    /// Builds the reply to one command
    pub fn reply(&self, command: &Command) -> traclink_protocol::Result<Bytes> {
        if let Some(raw) = self.raw_reply(command) {
            return Ok(raw.clone());
        }

        if let Some(description) = self.failure(command) {
            return response::encode_response(
                command,
                &Status::error(command.id(), description.clone()),
                None,
            );
        }

        let result = match command {
            Command::GetVersion => Some(ResultValue::Version(self.version.clone())),
            Command::GetEdgeIds => Some(ResultValue::StringList(self.edges.clone())),
            Command::ConvertLonLat { lon, lat } => Some(ResultValue::Position(Position {
                x: self.origin.x + lon * 1000.0,
                y: self.origin.y + lat * 1000.0,
            })),
            Command::GetRouteEdges { route_id } => match self.routes.get(route_id) {
                Some(edges) => Some(ResultValue::StringList(edges.clone())),
                None => return unknown(command, "Route", route_id),
            },
            Command::GetVehicleTypeVariable {
                vehicle_type,
                variable,
            } => match self.vehicle_types.get(&(vehicle_type.clone(), *variable)) {
                Some(value) => Some(ResultValue::Double(*value)),
                None => return unknown(command, "Vehicle type", vehicle_type),
            },
            Command::GetVehicleVariable {
                vehicle_id,
                variable,
            } => match self.vehicle_variables.get(&(vehicle_id.clone(), *variable)) {
                Some(value) => Some(ResultValue::Variable(value.clone())),
                None => return unknown(command, "Vehicle", vehicle_id),
            },
            _ => None,
        };

        response::encode_response(command, &Status::ok(command.id()), result.as_ref())
    }
}

fn unknown(command: &Command, kind: &str, id: &str) -> traclink_protocol::Result<Bytes> {
    response::encode_response(
        command,
        &Status::error(command.id(), format!("{kind} '{id}' is not known")),
        None,
    )
}

/// Commands received by loopback simulators, in arrival order
pub struct CommandLog {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CommandLog {
    /// Takes every command recorded so far
    pub fn drain(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Waits for the next recorded command
    pub async fn next(&mut self) -> Option<Command> {
        self.rx.recv().await
    }
}

/// Starts a simulator task and returns the client end of its stream
pub fn spawn(script: SimulatorScript) -> (DuplexStream, CommandLog) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = spawn_with(Arc::new(script), tx);
    (stream, CommandLog { rx })
}

fn spawn_with(script: Arc<SimulatorScript>, log: mpsc::UnboundedSender<Command>) -> DuplexStream {
    let (client, server) = duplex(DUPLEX_CAPACITY);
    tokio::spawn(async move {
        if let Err(e) = serve(server, &script, &log).await {
            tracing::debug!(error = %e, "Loopback simulator stopped");
        }
    });
    client
}

async fn serve(
    mut stream: DuplexStream,
    script: &SimulatorScript,
    log: &mpsc::UnboundedSender<Command>,
) -> std::io::Result<()> {
    loop {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        match stream.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }

        let total = frame::decode_length_prefix(prefix).map_err(invalid_data)?;
        let mut packet = vec![0u8; total];
        packet[..LENGTH_PREFIX_LEN].copy_from_slice(&prefix);
        stream.read_exact(&mut packet[LENGTH_PREFIX_LEN..]).await?;

        let command = Command::from_packet(&packet).map_err(invalid_data)?;
        tracing::trace!(command = ?command, "Loopback simulator received command");

        let reply = script.reply(&command).map_err(invalid_data)?;
        // A closed log only means nobody is watching
        let _ = log.send(command.clone());

        let chunk_len = reply.len().div_ceil(script.chunks).max(1);
        for chunk in reply.chunks(chunk_len) {
            stream.write_all(chunk).await?;
            stream.flush().await?;
            tokio::task::yield_now().await;
        }

        if command.id() == ids::CMD_CLOSE {
            return stream.shutdown().await;
        }
    }
}

fn invalid_data(e: traclink_protocol::ProtocolError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}

/// [`Connector`] that starts a fresh loopback simulator for every connect
#[derive(Clone)]
pub struct LoopbackConnector {
    script: Arc<SimulatorScript>,
    log: mpsc::UnboundedSender<Command>,
    refuse: bool,
}

impl LoopbackConnector {
    /// Creates a connector and the log all its simulators record into
    pub fn new(script: SimulatorScript) -> (Self, CommandLog) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::new(script),
            log: tx,
            refuse: false,
        };
        (connector, CommandLog { rx })
    }

    /// A connector whose every connect attempt is refused
    pub fn refusing() -> Self {
        let (connector, _) = Self::new(SimulatorScript::default());
        Self {
            refuse: true,
            ..connector
        }
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, host: &str, port: u16) -> std::io::Result<BoxedStream> {
        if self.refuse {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("loopback simulator at {host}:{port} refused the connection"),
            ));
        }

        tracing::debug!(host, port, "Starting loopback simulator");
        let stream = spawn_with(Arc::clone(&self.script), self.log.clone());
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traclink_protocol::Outcome;

    #[test]
    fn test_reply_to_unknown_route() {
        let script = SimulatorScript::new().with_route("r0", ["e1"]);
        let command = Command::GetRouteEdges {
            route_id: "r9".into(),
        };

        let reply = script.reply(&command).unwrap();
        match response::decode_string_list(&reply, &command).unwrap() {
            Outcome::Failed(status) => assert_eq!(status.description, "Route 'r9' is not known"),
            Outcome::Success(_) => panic!("unknown route must fail"),
        }
    }

    #[test]
    fn test_failure_narrowed_to_variable() {
        let script = SimulatorScript::new().failing(
            ids::CMD_SET_VEHICLE_VARIABLE,
            Some(ids::VAR_SPEED),
            "no such vehicle",
        );

        let rejected = script.reply(&Command::resume("v1")).unwrap();
        assert!(!response::decode_ack(&rejected, 0xc4).unwrap().is_success());

        let accepted = script
            .reply(&Command::ChangeSpeed {
                vehicle_id: "v1".into(),
                speed: 3.0,
                duration_ms: 100,
            })
            .unwrap();
        assert!(response::decode_ack(&accepted, 0xc4).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_records_commands() {
        let (mut stream, mut log) = spawn(SimulatorScript::new());

        let packet = Command::SimulationStep { target_time_ms: 0 }
            .to_packet()
            .unwrap();
        stream.write_all(&packet).await.unwrap();

        let mut reply = [0u8; 11];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0, 0, 0, 11, 7, 0x02, 0x00, 0, 0, 0, 0]);

        assert_eq!(
            log.next().await,
            Some(Command::SimulationStep { target_time_ms: 0 })
        );
    }
}
