//! # traclink client
//!
//! Session with a running traffic simulator.
//!
//! A [`Session`] owns the connection, the simulation clock and the pending
//! velocity overrides. Every operation sends one command and waits for its
//! fully decoded response before returning; there is no pipelining.
//!
//! ## Example
//!
//! ```no_run
//! use traclink_client::{Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> traclink_client::Result<()> {
//!     let mut session = Session::new(SessionConfig::new("127.0.0.1", 3456));
//!     session.connect().await?;
//!
//!     // Slow a vehicle down to 5 m/s over two seconds, then hold that speed
//!     session.change_speed("veh0", 5.0, 2000).await?;
//!     session.advance(3000).await?;
//!
//!     session.end_simulation().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod connector;
pub mod error;
pub mod loopback;
pub mod overrides;
pub mod transport;

pub use clock::SimulationClock;
pub use config::SessionConfig;
pub use connector::{Connector, TcpConnector};
pub use error::{ClientError, Result};
pub use overrides::{OverrideScheduler, PendingOverride};
pub use traclink_protocol::{
    EdgeWeight, Position, SessionState, VariableValue, VehicleTypeVariable, VehicleVariable,
    Version,
};

use bytes::Bytes;
use traclink_protocol::{response, Command, Outcome};

use crate::transport::Transport;

/// End of the interval `block_edge` applies its weight to, in simulated ms
pub const BLOCK_INTERVAL_END_MS: i32 = 10_000;

/// Live connection and the simulation state tied to it
struct Connection {
    transport: Transport,
    clock: SimulationClock,
    overrides: OverrideScheduler,
}

/// Client session with one simulator
///
/// Callers need exclusive (`&mut`) access; share a session across tasks by
/// wrapping it in a mutex.
pub struct Session {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    state: SessionState,
    connection: Option<Connection>,
}

impl Session {
    /// Creates a disconnected session that connects over TCP
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }

    /// Creates a disconnected session using a custom connector
    pub fn with_connector(config: SessionConfig, connector: impl Connector) -> Self {
        Self {
            config,
            connector: Box::new(connector),
            state: SessionState::Disconnected,
            connection: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_ready()
    }

    /// Steps executed since connecting, `None` while disconnected
    pub fn current_step(&self) -> Option<u64> {
        self.connection.as_ref().map(|c| c.clock.step())
    }

    /// Simulated milliseconds requested since connecting, `None` while disconnected
    pub fn accumulated_ms(&self) -> Option<u64> {
        self.connection.as_ref().map(|c| c.clock.accumulated_ms())
    }

    pub fn pending_override(&self, vehicle_id: &str) -> Option<&PendingOverride> {
        self.connection
            .as_ref()
            .and_then(|c| c.overrides.get(vehicle_id))
    }

    /// Connects to the configured host and port
    pub async fn connect(&mut self) -> Result<()> {
        let host = self.config.host.clone();
        let port = self.config.port;
        self.connect_to(&host, port).await
    }

    /// Connects to `host:port`, dropping any existing connection first
    ///
    /// On success the step counter and accumulated time start at zero and no
    /// overrides are pending.
    pub async fn connect_to(&mut self, host: &str, port: u16) -> Result<()> {
        self.config.validate()?;

        if self.connection.is_some() {
            tracing::info!("Replacing existing simulator connection");
            self.close().await;
        } else {
            // A cancelled connect may have left the state at Connecting
            self.mark_disconnected();
        }

        self.state.transition_to(SessionState::Connecting)?;
        let addr = format!("{host}:{port}");
        tracing::info!(addr = %addr, "Connecting to simulator");

        let timeout = self.config.connect_timeout;
        let stream = match tokio::time::timeout(timeout, self.connector.connect(host, port)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                tracing::error!(addr = %addr, error = %source, "Connection failed");
                self.state.transition_to(SessionState::Disconnected)?;
                return Err(ClientError::ConnectFailure { addr, source });
            }
            Err(_) => {
                tracing::error!(addr = %addr, ?timeout, "Connection timed out");
                self.state.transition_to(SessionState::Disconnected)?;
                return Err(ClientError::ConnectTimeout { addr, timeout });
            }
        };

        self.connection = Some(Connection {
            transport: Transport::new(
                stream,
                self.config.read_timeout,
                self.config.max_response_len,
            ),
            clock: SimulationClock::new(self.config.step_length_ms),
            overrides: OverrideScheduler::new(),
        });
        self.state.transition_to(SessionState::Ready)?;

        tracing::info!(addr = %addr, "Connected to simulator");
        Ok(())
    }

    /// Drops the connection without telling the simulator
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.transport.shutdown().await;
            tracing::info!(
                step = connection.clock.step(),
                pending_overrides = connection.overrides.len(),
                "Session closed"
            );
        }
        self.mark_disconnected();
    }

    fn mark_disconnected(&mut self) {
        self.connection = None;
        // Disconnected is reachable from every state
        self.state = SessionState::Disconnected;
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or(ClientError::NotConnected)
    }

    /// Sends one command and returns the complete raw response
    async fn execute(&mut self, command: &Command) -> Result<Bytes> {
        let connection = self.connection_mut()?;
        let packet = command.to_packet()?;

        tracing::debug!(
            command = command.id(),
            bytes = packet.len(),
            "Sending command"
        );

        let result = match connection.transport.send(&packet).await {
            Ok(()) => connection.transport.receive().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                tracing::debug!(
                    command = command.id(),
                    bytes = response.len(),
                    "Response received"
                );
                Ok(response)
            }
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(error = %e, "Transport failure, session disconnected");
                    self.mark_disconnected();
                }
                Err(e)
            }
        }
    }

    /// Sends a command whose response carries only a status
    async fn execute_ack(&mut self, command: &Command) -> Result<()> {
        let response = self.execute(command).await?;
        let outcome = response::decode_ack(&response, command.id())?;
        simulator_result(command, outcome)
    }

    /// Advances the simulation by exactly one step
    pub async fn single_step(&mut self) -> Result<()> {
        let step_length = self.connection_mut()?.clock.step_length_ms();
        self.connection_mut()?.clock.add_elapsed(step_length);
        self.run_step().await
    }

    /// Advances simulated time by `elapsed_ms`
    ///
    /// Runs as many whole steps as the accumulated time now covers and
    /// returns that count. The remainder carries over to the next call. If a
    /// step fails, the steps not yet run stay due for the next call.
    pub async fn advance(&mut self, elapsed_ms: u64) -> Result<u64> {
        let due = self.connection_mut()?.clock.add_elapsed(elapsed_ms);

        for _ in 0..due {
            self.run_step().await?;
        }

        if due > 0 {
            tracing::debug!(
                steps = due,
                step = ?self.current_step(),
                accumulated_ms = ?self.accumulated_ms(),
                "Simulation advanced"
            );
        }
        Ok(due)
    }

    async fn run_step(&mut self) -> Result<()> {
        self.execute_ack(&Command::SimulationStep { target_time_ms: 0 })
            .await?;

        let clock = &mut self.connection_mut()?.clock;
        let now_ms = clock.complete_step();
        tracing::trace!(step = clock.step(), now_ms, "Step completed");

        self.reassert_expired(now_ms).await
    }

    /// Reasserts the restore speed of every override expired at `now_ms`
    async fn reassert_expired(&mut self, now_ms: u64) -> Result<()> {
        while let Some(pending) = self.connection_mut()?.overrides.pop_expired(now_ms) {
            let command = Command::SetSpeed {
                vehicle_id: pending.vehicle_id.clone(),
                speed: pending.restore_speed,
            };

            match self.execute_ack(&command).await {
                Ok(()) => tracing::debug!(
                    vehicle = %pending.vehicle_id,
                    speed = pending.restore_speed,
                    "Speed override expired, speed reasserted"
                ),
                Err(ClientError::Simulator { description, .. }) => tracing::warn!(
                    vehicle = %pending.vehicle_id,
                    %description,
                    "Simulator rejected speed reassertion"
                ),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Changes a vehicle's speed to `speed` over `duration_ms` and keeps it there
    ///
    /// Once the duration has elapsed in simulated time, `speed` is reasserted
    /// as a constant speed. A later call for the same vehicle replaces the
    /// pending reassertion.
    pub async fn change_speed(
        &mut self,
        vehicle_id: &str,
        speed: f64,
        duration_ms: i32,
    ) -> Result<()> {
        let command = Command::ChangeSpeed {
            vehicle_id: vehicle_id.to_string(),
            speed,
            duration_ms,
        };
        self.execute_ack(&command).await?;

        let connection = self.connection_mut()?;
        let expiry_ms = connection
            .clock
            .accumulated_ms()
            .saturating_add(u64::from(duration_ms.unsigned_abs()));
        if connection
            .overrides
            .schedule(vehicle_id, expiry_ms, speed)
            .is_some()
        {
            tracing::debug!(vehicle = %vehicle_id, "Replaced pending speed override");
        }
        Ok(())
    }

    /// Hands the vehicle back to its car-following model
    pub async fn resume(&mut self, vehicle_id: &str) -> Result<()> {
        self.connection_mut()?.overrides.cancel(vehicle_id);
        self.execute_ack(&Command::resume(vehicle_id)).await
    }

    pub async fn set_max_speed(&mut self, vehicle_id: &str, speed: f64) -> Result<()> {
        self.execute_ack(&Command::SetMaxSpeed {
            vehicle_id: vehicle_id.to_string(),
            speed,
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_vehicle(
        &mut self,
        vehicle_id: &str,
        vehicle_type: &str,
        route_id: &str,
        depart_time_ms: i32,
        depart_position: f64,
        depart_speed: f64,
        depart_lane: u8,
    ) -> Result<()> {
        self.execute_ack(&Command::AddVehicle {
            vehicle_id: vehicle_id.to_string(),
            vehicle_type: vehicle_type.to_string(),
            route_id: route_id.to_string(),
            depart_time_ms,
            depart_position,
            depart_speed,
            depart_lane,
        })
        .await
    }

    pub async fn add_stop(
        &mut self,
        vehicle_id: &str,
        edge_id: &str,
        position: f64,
        lane: u8,
        duration_ms: i32,
    ) -> Result<()> {
        self.execute_ack(&Command::AddStop {
            vehicle_id: vehicle_id.to_string(),
            edge_id: edge_id.to_string(),
            position,
            lane,
            duration_ms,
        })
        .await
    }

    /// Converts a geographic coordinate into network x/y
    pub async fn convert_lon_lat(&mut self, lon: f64, lat: f64) -> Result<Position> {
        let command = Command::ConvertLonLat { lon, lat };
        let response = self.execute(&command).await?;
        simulator_result(&command, response::decode_position(&response, &command)?)
    }

    /// Ids of every edge in the network
    pub async fn edge_list(&mut self) -> Result<Vec<String>> {
        let command = Command::GetEdgeIds;
        let response = self.execute(&command).await?;
        simulator_result(&command, response::decode_string_list(&response, &command)?)
    }

    pub async fn vehicle_type_property(
        &mut self,
        vehicle_type: &str,
        variable: VehicleTypeVariable,
    ) -> Result<f64> {
        let command = Command::GetVehicleTypeVariable {
            vehicle_type: vehicle_type.to_string(),
            variable,
        };
        let response = self.execute(&command).await?;
        simulator_result(&command, response::decode_scalar_double(&response, &command)?)
    }

    pub async fn vehicle_variable(
        &mut self,
        vehicle_id: &str,
        variable: VehicleVariable,
    ) -> Result<VariableValue> {
        let command = Command::GetVehicleVariable {
            vehicle_id: vehicle_id.to_string(),
            variable,
        };
        let response = self.execute(&command).await?;
        simulator_result(
            &command,
            response::decode_scalar_string_or_int(&response, &command)?,
        )
    }

    /// Edge ids making up a route
    pub async fn route_edges(&mut self, route_id: &str) -> Result<Vec<String>> {
        let command = Command::GetRouteEdges {
            route_id: route_id.to_string(),
        };
        let response = self.execute(&command).await?;
        simulator_result(&command, response::decode_string_list(&response, &command)?)
    }

    pub async fn get_version(&mut self) -> Result<Version> {
        let command = Command::GetVersion;
        let response = self.execute(&command).await?;
        simulator_result(&command, response::decode_version(&response)?)
    }

    /// Replaces the vehicle classes allowed (or disallowed) on a lane
    pub async fn set_lane_allowed_classes(
        &mut self,
        lane_id: &str,
        classes: &[&str],
        allow: bool,
    ) -> Result<()> {
        self.execute_ack(&Command::SetLaneClasses {
            lane_id: lane_id.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            allow,
        })
        .await
    }

    pub async fn set_edge_weight(
        &mut self,
        edge_id: &str,
        kind: EdgeWeight,
        begin_ms: i32,
        end_ms: i32,
        value: f64,
    ) -> Result<()> {
        self.execute_ack(&Command::SetEdgeWeight {
            edge_id: edge_id.to_string(),
            kind,
            begin_ms,
            end_ms,
            value,
        })
        .await
    }

    /// Makes an edge practically unusable for routing
    pub async fn block_edge(&mut self, edge_id: &str, kind: EdgeWeight) -> Result<()> {
        self.set_edge_weight(edge_id, kind, 0, BLOCK_INTERVAL_END_MS, f64::MAX)
            .await
    }

    pub async fn set_vehicle_type_class(&mut self, vehicle_type: &str, class: &str) -> Result<()> {
        self.execute_ack(&Command::SetVehicleTypeClass {
            vehicle_type: vehicle_type.to_string(),
            class: class.to_string(),
        })
        .await
    }

    /// Sets the driver imperfection (sigma) of a vehicle type
    pub async fn set_vehicle_type_imperfection(
        &mut self,
        vehicle_type: &str,
        imperfection: f64,
    ) -> Result<()> {
        self.execute_ack(&Command::SetVehicleTypeImperfection {
            vehicle_type: vehicle_type.to_string(),
            imperfection,
        })
        .await
    }

    /// Ends the simulation and closes the connection
    ///
    /// The session is disconnected afterwards, even if the simulator rejects
    /// the request or drops the connection before answering.
    pub async fn end_simulation(&mut self) -> Result<()> {
        let result = self.execute_ack(&Command::Close).await;
        self.close().await;

        match result {
            Err(ClientError::ConnectionClosed) => {
                tracing::info!("Simulator closed the connection while ending");
                Ok(())
            }
            Ok(()) => {
                tracing::info!("Simulation ended");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Turns a decoded outcome into the value or a simulator error
fn simulator_result<T>(command: &Command, outcome: Outcome<T>) -> Result<T> {
    outcome.into_result().map_err(|status| {
        tracing::debug!(
            command = command.id(),
            result = status.result,
            description = %status.description,
            "Simulator rejected command"
        );
        ClientError::Simulator {
            command: status.command_id,
            description: status.description,
        }
    })
}
