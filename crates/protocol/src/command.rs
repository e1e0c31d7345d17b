//! Commands understood by the simulator
//!
//! A [`Command`] is a pure value: encoding it performs no I/O and the same
//! command always produces the same bytes. Arguments are validated before any
//! byte is written, so a malformed command never reaches the wire.
//!
//! # Example
//!
//! ```
//! use traclink_protocol::{Command, command::ids};
//!
//! let command = Command::ChangeSpeed {
//!     vehicle_id: "veh0".into(),
//!     speed: 10.0,
//!     duration_ms: 2000,
//! };
//! assert_eq!(command.id(), ids::CMD_SET_VEHICLE_VARIABLE);
//!
//! let packet = command.to_packet().unwrap();
//! assert_eq!(Command::from_packet(&packet).unwrap(), command);
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::frame;
use crate::value::{self, Reader, ValueType};

/// Command identifiers and variable/subcommand bytes
pub mod ids {
    /// Simulator version query
    pub const CMD_GET_VERSION: u8 = 0x00;

    /// Advance the simulation
    pub const CMD_SIMSTEP: u8 = 0x02;

    /// End the simulation and close the connection
    pub const CMD_CLOSE: u8 = 0x7F;

    pub const CMD_GET_VEHICLE_VARIABLE: u8 = 0xa4;
    pub const CMD_GET_VEHICLETYPE_VARIABLE: u8 = 0xa5;
    pub const CMD_GET_ROUTE_VARIABLE: u8 = 0xa6;
    pub const CMD_GET_EDGE_VARIABLE: u8 = 0xaa;
    pub const CMD_GET_SIM_VARIABLE: u8 = 0xab;

    pub const CMD_SET_LANE_VARIABLE: u8 = 0xc3;
    pub const CMD_SET_VEHICLE_VARIABLE: u8 = 0xc4;
    pub const CMD_SET_VEHICLETYPE_VARIABLE: u8 = 0xc5;
    pub const CMD_SET_EDGE_VARIABLE: u8 = 0xca;

    /// Result blocks of GET commands echo `command_id + RESPONSE_OFFSET`
    pub const RESPONSE_OFFSET: u8 = 0x10;

    // Vehicle subcommands (0xc4)
    pub const CMD_STOP: u8 = 0x12;
    pub const CMD_SLOWDOWN: u8 = 0x14;
    pub const VAR_SPEED: u8 = 0x40;
    pub const VAR_MAXSPEED: u8 = 0x41;
    pub const ADD: u8 = 0x80;

    // Vehicle variables (0xa4)
    pub const VAR_LANE_INDEX: u8 = 0x52;
    pub const VAR_ROUTE_ID: u8 = 0x53;

    // Vehicle type variables (0xa5, 0xc5)
    pub const VAR_LENGTH: u8 = 0x44;
    pub const VAR_ACCEL: u8 = 0x46;
    pub const VAR_DECEL: u8 = 0x47;
    pub const VAR_VEHICLECLASS: u8 = 0x49;
    pub const VAR_WIDTH: u8 = 0x4d;
    pub const VAR_IMPERFECTION: u8 = 0x5d;

    // Route / edge / lane / simulation variables
    pub const ID_LIST: u8 = 0x00;
    pub const VAR_EDGES: u8 = 0x54;
    pub const LANE_ALLOWED: u8 = 0x34;
    pub const LANE_DISALLOWED: u8 = 0x35;
    pub const VAR_EDGE_TRAVELTIME: u8 = 0x58;
    pub const VAR_EDGE_EFFORT: u8 = 0x59;
    pub const POSITION_CONVERSION: u8 = 0x82;

    /// Speed value that hands control back to the car-following model
    pub const RESUME_SPEED: f64 = -1.0;
}

/// Static vehicle-type properties that can be queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleTypeVariable {
    Length,
    Width,
    MaxAccel,
    MaxSpeed,
    MaxDecel,
}

impl VehicleTypeVariable {
    pub fn code(self) -> u8 {
        match self {
            Self::Length => ids::VAR_LENGTH,
            Self::Width => ids::VAR_WIDTH,
            Self::MaxAccel => ids::VAR_ACCEL,
            Self::MaxSpeed => ids::VAR_MAXSPEED,
            Self::MaxDecel => ids::VAR_DECEL,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            ids::VAR_LENGTH => Some(Self::Length),
            ids::VAR_WIDTH => Some(Self::Width),
            ids::VAR_ACCEL => Some(Self::MaxAccel),
            ids::VAR_MAXSPEED => Some(Self::MaxSpeed),
            ids::VAR_DECEL => Some(Self::MaxDecel),
            _ => None,
        }
    }
}

/// Per-vehicle variables that can be queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleVariable {
    /// String-typed route id
    RouteId,
    /// Int-typed lane index
    LaneIndex,
}

impl VehicleVariable {
    pub fn code(self) -> u8 {
        match self {
            Self::RouteId => ids::VAR_ROUTE_ID,
            Self::LaneIndex => ids::VAR_LANE_INDEX,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            ids::VAR_ROUTE_ID => Some(Self::RouteId),
            ids::VAR_LANE_INDEX => Some(Self::LaneIndex),
            _ => None,
        }
    }
}

/// Which edge weight a [`Command::SetEdgeWeight`] adjusts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeWeight {
    TravelTime,
    Effort,
}

impl EdgeWeight {
    pub fn code(self) -> u8 {
        match self {
            Self::TravelTime => ids::VAR_EDGE_TRAVELTIME,
            Self::Effort => ids::VAR_EDGE_EFFORT,
        }
    }
}

/// A single request to the simulator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Advance to `target_time_ms`; 0 advances exactly one step
    SimulationStep { target_time_ms: i32 },

    /// Reach `speed` over `duration_ms`, then hold it
    ChangeSpeed {
        vehicle_id: String,
        speed: f64,
        duration_ms: i32,
    },

    /// Hold a constant speed; [`ids::RESUME_SPEED`] resumes normal driving
    SetSpeed { vehicle_id: String, speed: f64 },

    SetMaxSpeed { vehicle_id: String, speed: f64 },

    AddStop {
        vehicle_id: String,
        edge_id: String,
        position: f64,
        lane: u8,
        duration_ms: i32,
    },

    AddVehicle {
        vehicle_id: String,
        vehicle_type: String,
        route_id: String,
        depart_time_ms: i32,
        depart_position: f64,
        depart_speed: f64,
        depart_lane: u8,
    },

    /// Convert a geographic coordinate to network x/y
    ConvertLonLat { lon: f64, lat: f64 },

    GetEdgeIds,

    GetVehicleTypeVariable {
        vehicle_type: String,
        variable: VehicleTypeVariable,
    },

    GetVehicleVariable {
        vehicle_id: String,
        variable: VehicleVariable,
    },

    GetRouteEdges { route_id: String },

    Close,

    GetVersion,

    /// Replace the allowed (or disallowed) vehicle classes of a lane
    SetLaneClasses {
        lane_id: String,
        classes: Vec<String>,
        allow: bool,
    },

    SetEdgeWeight {
        edge_id: String,
        kind: EdgeWeight,
        begin_ms: i32,
        end_ms: i32,
        value: f64,
    },

    SetVehicleTypeClass {
        vehicle_type: String,
        class: String,
    },

    SetVehicleTypeImperfection {
        vehicle_type: String,
        imperfection: f64,
    },
}

fn require_id(what: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ProtocolError::invalid(format!("{what} must not be empty")));
    }
    Ok(())
}

fn require_non_negative(what: &str, value: i32) -> Result<()> {
    if value < 0 {
        return Err(ProtocolError::invalid(format!(
            "{what} must not be negative, got {value}"
        )));
    }
    Ok(())
}

fn require_finite(what: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(ProtocolError::invalid(format!(
            "{what} must be finite, got {value}"
        )));
    }
    Ok(())
}

impl Command {
    /// Shorthand for the resume request (`SetSpeed` with the -1.0 sentinel)
    pub fn resume(vehicle_id: impl Into<String>) -> Self {
        Self::SetSpeed {
            vehicle_id: vehicle_id.into(),
            speed: ids::RESUME_SPEED,
        }
    }

    /// Command identifier byte
    pub fn id(&self) -> u8 {
        match self {
            Self::SimulationStep { .. } => ids::CMD_SIMSTEP,
            Self::ChangeSpeed { .. }
            | Self::SetSpeed { .. }
            | Self::SetMaxSpeed { .. }
            | Self::AddStop { .. }
            | Self::AddVehicle { .. } => ids::CMD_SET_VEHICLE_VARIABLE,
            Self::ConvertLonLat { .. } => ids::CMD_GET_SIM_VARIABLE,
            Self::GetEdgeIds => ids::CMD_GET_EDGE_VARIABLE,
            Self::GetVehicleTypeVariable { .. } => ids::CMD_GET_VEHICLETYPE_VARIABLE,
            Self::GetVehicleVariable { .. } => ids::CMD_GET_VEHICLE_VARIABLE,
            Self::GetRouteEdges { .. } => ids::CMD_GET_ROUTE_VARIABLE,
            Self::Close => ids::CMD_CLOSE,
            Self::GetVersion => ids::CMD_GET_VERSION,
            Self::SetLaneClasses { .. } => ids::CMD_SET_LANE_VARIABLE,
            Self::SetEdgeWeight { .. } => ids::CMD_SET_EDGE_VARIABLE,
            Self::SetVehicleTypeClass { .. } | Self::SetVehicleTypeImperfection { .. } => {
                ids::CMD_SET_VEHICLETYPE_VARIABLE
            }
        }
    }

    /// Subcommand or variable byte leading the payload, if any
    pub fn variable(&self) -> Option<u8> {
        match self {
            Self::SimulationStep { .. } | Self::Close | Self::GetVersion => None,
            Self::ChangeSpeed { .. } => Some(ids::CMD_SLOWDOWN),
            Self::SetSpeed { .. } => Some(ids::VAR_SPEED),
            Self::SetMaxSpeed { .. } => Some(ids::VAR_MAXSPEED),
            Self::AddStop { .. } => Some(ids::CMD_STOP),
            Self::AddVehicle { .. } => Some(ids::ADD),
            Self::ConvertLonLat { .. } => Some(ids::POSITION_CONVERSION),
            Self::GetEdgeIds => Some(ids::ID_LIST),
            Self::GetVehicleTypeVariable { variable, .. } => Some(variable.code()),
            Self::GetVehicleVariable { variable, .. } => Some(variable.code()),
            Self::GetRouteEdges { .. } => Some(ids::VAR_EDGES),
            Self::SetLaneClasses { allow, .. } => Some(if *allow {
                ids::LANE_ALLOWED
            } else {
                ids::LANE_DISALLOWED
            }),
            Self::SetEdgeWeight { kind, .. } => Some(kind.code()),
            Self::SetVehicleTypeClass { .. } => Some(ids::VAR_VEHICLECLASS),
            Self::SetVehicleTypeImperfection { .. } => Some(ids::VAR_IMPERFECTION),
        }
    }

    /// Command id expected in the result block, for commands that return a value
    pub fn response_id(&self) -> Option<u8> {
        match self {
            Self::ConvertLonLat { .. }
            | Self::GetEdgeIds
            | Self::GetVehicleTypeVariable { .. }
            | Self::GetVehicleVariable { .. }
            | Self::GetRouteEdges { .. } => Some(self.id() + ids::RESPONSE_OFFSET),
            Self::GetVersion => Some(ids::CMD_GET_VERSION),
            _ => None,
        }
    }

    /// Rejects arguments that cannot be encoded meaningfully
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SimulationStep { target_time_ms } => {
                require_non_negative("target time", *target_time_ms)
            }
            Self::ChangeSpeed {
                vehicle_id,
                speed,
                duration_ms,
            } => {
                require_id("vehicle id", vehicle_id)?;
                require_finite("speed", *speed)?;
                require_non_negative("duration", *duration_ms)
            }
            Self::SetSpeed { vehicle_id, speed } => {
                require_id("vehicle id", vehicle_id)?;
                require_finite("speed", *speed)
            }
            Self::SetMaxSpeed { vehicle_id, speed } => {
                require_id("vehicle id", vehicle_id)?;
                require_finite("max speed", *speed)?;
                if *speed < 0.0 {
                    return Err(ProtocolError::invalid(format!(
                        "max speed must not be negative, got {speed}"
                    )));
                }
                Ok(())
            }
            Self::AddStop {
                vehicle_id,
                edge_id,
                position,
                duration_ms,
                ..
            } => {
                require_id("vehicle id", vehicle_id)?;
                require_id("edge id", edge_id)?;
                require_finite("stop position", *position)?;
                require_non_negative("stop duration", *duration_ms)
            }
            Self::AddVehicle {
                vehicle_id,
                vehicle_type,
                route_id,
                depart_position,
                depart_speed,
                ..
            } => {
                require_id("vehicle id", vehicle_id)?;
                require_id("vehicle type", vehicle_type)?;
                require_id("route id", route_id)?;
                require_finite("depart position", *depart_position)?;
                require_finite("depart speed", *depart_speed)
            }
            Self::ConvertLonLat { lon, lat } => {
                require_finite("longitude", *lon)?;
                require_finite("latitude", *lat)
            }
            Self::GetEdgeIds | Self::Close | Self::GetVersion => Ok(()),
            Self::GetVehicleTypeVariable { vehicle_type, .. } => {
                require_id("vehicle type", vehicle_type)
            }
            Self::GetVehicleVariable { vehicle_id, .. } => require_id("vehicle id", vehicle_id),
            Self::GetRouteEdges { route_id } => require_id("route id", route_id),
            Self::SetLaneClasses {
                lane_id, classes, ..
            } => {
                require_id("lane id", lane_id)?;
                classes
                    .iter()
                    .try_for_each(|class| require_id("vehicle class", class))
            }
            Self::SetEdgeWeight {
                edge_id,
                begin_ms,
                end_ms,
                value,
                ..
            } => {
                require_id("edge id", edge_id)?;
                require_non_negative("begin time", *begin_ms)?;
                if end_ms < begin_ms {
                    return Err(ProtocolError::invalid(format!(
                        "end time {end_ms} precedes begin time {begin_ms}"
                    )));
                }
                require_finite("edge weight", *value)
            }
            Self::SetVehicleTypeClass {
                vehicle_type,
                class,
            } => {
                require_id("vehicle type", vehicle_type)?;
                require_id("vehicle class", class)
            }
            Self::SetVehicleTypeImperfection {
                vehicle_type,
                imperfection,
            } => {
                require_id("vehicle type", vehicle_type)?;
                require_finite("imperfection", *imperfection)
            }
        }
    }

    /// Encodes the command payload (everything after the command id)
    pub fn encode(&self) -> Result<Bytes> {
        self.validate()?;

        let mut buf = BytesMut::with_capacity(64);
        if let Some(variable) = self.variable() {
            value::encode_byte(&mut buf, variable);
        }

        match self {
            Self::SimulationStep { target_time_ms } => {
                value::encode_int32(&mut buf, *target_time_ms);
            }
            Self::ChangeSpeed {
                vehicle_id,
                speed,
                duration_ms,
            } => {
                value::encode_string(&mut buf, vehicle_id)?;
                value::encode_compound_header(&mut buf, 2)?;
                value::encode_tagged_float64(&mut buf, *speed);
                value::encode_tagged_int32(&mut buf, *duration_ms);
            }
            Self::SetSpeed { vehicle_id, speed } | Self::SetMaxSpeed { vehicle_id, speed } => {
                value::encode_string(&mut buf, vehicle_id)?;
                value::encode_tagged_float64(&mut buf, *speed);
            }
            Self::AddStop {
                vehicle_id,
                edge_id,
                position,
                lane,
                duration_ms,
            } => {
                value::encode_string(&mut buf, vehicle_id)?;
                value::encode_compound_header(&mut buf, 4)?;
                value::encode_tagged_string(&mut buf, edge_id)?;
                value::encode_tagged_float64(&mut buf, *position);
                value::encode_tagged_byte(&mut buf, *lane);
                value::encode_tagged_int32(&mut buf, *duration_ms);
            }
            Self::AddVehicle {
                vehicle_id,
                vehicle_type,
                route_id,
                depart_time_ms,
                depart_position,
                depart_speed,
                depart_lane,
            } => {
                value::encode_string(&mut buf, vehicle_id)?;
                value::encode_compound_header(&mut buf, 6)?;
                value::encode_tagged_string(&mut buf, vehicle_type)?;
                value::encode_tagged_string(&mut buf, route_id)?;
                value::encode_tagged_int32(&mut buf, *depart_time_ms);
                value::encode_tagged_float64(&mut buf, *depart_position);
                value::encode_tagged_float64(&mut buf, *depart_speed);
                value::encode_tagged_byte(&mut buf, *depart_lane);
            }
            Self::ConvertLonLat { lon, lat } => {
                // Simulation-level variable: the object id is empty
                value::encode_string(&mut buf, "")?;
                value::encode_compound_header(&mut buf, 2)?;
                value::encode_tag(&mut buf, ValueType::PositionLonLat);
                value::encode_float64(&mut buf, *lon);
                value::encode_float64(&mut buf, *lat);
                value::encode_tagged_ubyte(&mut buf, ValueType::Position2D.tag());
            }
            Self::GetEdgeIds => {
                value::encode_string(&mut buf, "")?;
            }
            Self::GetVehicleTypeVariable { vehicle_type, .. } => {
                value::encode_string(&mut buf, vehicle_type)?;
            }
            Self::GetVehicleVariable { vehicle_id, .. } => {
                value::encode_string(&mut buf, vehicle_id)?;
            }
            Self::GetRouteEdges { route_id } => {
                value::encode_string(&mut buf, route_id)?;
            }
            Self::Close | Self::GetVersion => {}
            Self::SetLaneClasses {
                lane_id, classes, ..
            } => {
                value::encode_string(&mut buf, lane_id)?;
                value::encode_tagged_string_list(&mut buf, classes)?;
            }
            Self::SetEdgeWeight {
                edge_id,
                begin_ms,
                end_ms,
                value: weight,
                ..
            } => {
                value::encode_string(&mut buf, edge_id)?;
                value::encode_compound_header(&mut buf, 3)?;
                value::encode_tagged_int32(&mut buf, *begin_ms);
                value::encode_tagged_int32(&mut buf, *end_ms);
                value::encode_tagged_float64(&mut buf, *weight);
            }
            Self::SetVehicleTypeClass {
                vehicle_type,
                class,
            } => {
                value::encode_string(&mut buf, vehicle_type)?;
                value::encode_tagged_string(&mut buf, class)?;
            }
            Self::SetVehicleTypeImperfection {
                vehicle_type,
                imperfection,
            } => {
                value::encode_string(&mut buf, vehicle_type)?;
                value::encode_tagged_float64(&mut buf, *imperfection);
            }
        }

        Ok(buf.freeze())
    }

    /// Encodes and frames the command, ready for the socket
    pub fn to_packet(&self) -> Result<Bytes> {
        let payload = self.encode()?;
        Ok(frame::frame(self.id(), &payload))
    }

    /// Recovers a command from a framed packet
    pub fn from_packet(packet: &[u8]) -> Result<Self> {
        let (command_id, payload) = frame::unframe(packet)?;
        Self::decode(command_id, payload)
    }

    /// Decodes a command payload received under `command_id`
    pub fn decode(command_id: u8, payload: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(payload);

        let command = match command_id {
            ids::CMD_SIMSTEP => Self::SimulationStep {
                target_time_ms: reader.decode_int32()?,
            },
            ids::CMD_CLOSE => Self::Close,
            ids::CMD_GET_VERSION => Self::GetVersion,
            ids::CMD_SET_VEHICLE_VARIABLE => Self::decode_vehicle_change(&mut reader)?,
            ids::CMD_GET_SIM_VARIABLE => {
                expect_variable(&mut reader, command_id, ids::POSITION_CONVERSION)?;
                reader.decode_string()?;
                reader.expect_compound(2)?;
                reader.expect_tag(ValueType::PositionLonLat)?;
                let lon = reader.decode_float64()?;
                let lat = reader.decode_float64()?;
                let target = reader.decode_tagged_ubyte()?;
                if target != ValueType::Position2D.tag() {
                    return Err(ProtocolError::mismatch(
                        "conversion target",
                        ValueType::Position2D.tag(),
                        target,
                    ));
                }
                Self::ConvertLonLat { lon, lat }
            }
            ids::CMD_GET_EDGE_VARIABLE => {
                expect_variable(&mut reader, command_id, ids::ID_LIST)?;
                reader.decode_string()?;
                Self::GetEdgeIds
            }
            ids::CMD_GET_VEHICLETYPE_VARIABLE => {
                let code = reader.decode_byte()?;
                let variable = VehicleTypeVariable::from_code(code).ok_or(
                    ProtocolError::UnknownCommand {
                        command: command_id,
                        subcommand: code,
                    },
                )?;
                Self::GetVehicleTypeVariable {
                    vehicle_type: reader.decode_string()?,
                    variable,
                }
            }
            ids::CMD_GET_VEHICLE_VARIABLE => {
                let code = reader.decode_byte()?;
                let variable =
                    VehicleVariable::from_code(code).ok_or(ProtocolError::UnknownCommand {
                        command: command_id,
                        subcommand: code,
                    })?;
                Self::GetVehicleVariable {
                    vehicle_id: reader.decode_string()?,
                    variable,
                }
            }
            ids::CMD_GET_ROUTE_VARIABLE => {
                expect_variable(&mut reader, command_id, ids::VAR_EDGES)?;
                Self::GetRouteEdges {
                    route_id: reader.decode_string()?,
                }
            }
            ids::CMD_SET_LANE_VARIABLE => {
                let allow = match reader.decode_byte()? {
                    ids::LANE_ALLOWED => true,
                    ids::LANE_DISALLOWED => false,
                    other => {
                        return Err(ProtocolError::UnknownCommand {
                            command: command_id,
                            subcommand: other,
                        })
                    }
                };
                Self::SetLaneClasses {
                    lane_id: reader.decode_string()?,
                    classes: reader.decode_tagged_string_list()?,
                    allow,
                }
            }
            ids::CMD_SET_EDGE_VARIABLE => {
                let kind = match reader.decode_byte()? {
                    ids::VAR_EDGE_TRAVELTIME => EdgeWeight::TravelTime,
                    ids::VAR_EDGE_EFFORT => EdgeWeight::Effort,
                    other => {
                        return Err(ProtocolError::UnknownCommand {
                            command: command_id,
                            subcommand: other,
                        })
                    }
                };
                let edge_id = reader.decode_string()?;
                reader.expect_compound(3)?;
                Self::SetEdgeWeight {
                    edge_id,
                    kind,
                    begin_ms: reader.decode_tagged_int32()?,
                    end_ms: reader.decode_tagged_int32()?,
                    value: reader.decode_tagged_float64()?,
                }
            }
            ids::CMD_SET_VEHICLETYPE_VARIABLE => match reader.decode_byte()? {
                ids::VAR_VEHICLECLASS => Self::SetVehicleTypeClass {
                    vehicle_type: reader.decode_string()?,
                    class: reader.decode_tagged_string()?,
                },
                ids::VAR_IMPERFECTION => Self::SetVehicleTypeImperfection {
                    vehicle_type: reader.decode_string()?,
                    imperfection: reader.decode_tagged_float64()?,
                },
                other => {
                    return Err(ProtocolError::UnknownCommand {
                        command: command_id,
                        subcommand: other,
                    })
                }
            },
            other => {
                return Err(ProtocolError::UnknownCommand {
                    command: other,
                    subcommand: 0,
                })
            }
        };

        if !reader.is_empty() {
            return Err(ProtocolError::invalid(format!(
                "{} trailing bytes after command {command_id:#04x}",
                reader.remaining()
            )));
        }

        Ok(command)
    }

    fn decode_vehicle_change(reader: &mut Reader<'_>) -> Result<Self> {
        let subcommand = reader.decode_byte()?;
        let vehicle_id = reader.decode_string()?;

        let command = match subcommand {
            ids::CMD_SLOWDOWN => {
                reader.expect_compound(2)?;
                Self::ChangeSpeed {
                    vehicle_id,
                    speed: reader.decode_tagged_float64()?,
                    duration_ms: reader.decode_tagged_int32()?,
                }
            }
            ids::VAR_SPEED => Self::SetSpeed {
                vehicle_id,
                speed: reader.decode_tagged_float64()?,
            },
            ids::VAR_MAXSPEED => Self::SetMaxSpeed {
                vehicle_id,
                speed: reader.decode_tagged_float64()?,
            },
            ids::CMD_STOP => {
                reader.expect_compound(4)?;
                Self::AddStop {
                    vehicle_id,
                    edge_id: reader.decode_tagged_string()?,
                    position: reader.decode_tagged_float64()?,
                    lane: reader.decode_tagged_byte()?,
                    duration_ms: reader.decode_tagged_int32()?,
                }
            }
            ids::ADD => {
                reader.expect_compound(6)?;
                Self::AddVehicle {
                    vehicle_id,
                    vehicle_type: reader.decode_tagged_string()?,
                    route_id: reader.decode_tagged_string()?,
                    depart_time_ms: reader.decode_tagged_int32()?,
                    depart_position: reader.decode_tagged_float64()?,
                    depart_speed: reader.decode_tagged_float64()?,
                    depart_lane: reader.decode_tagged_byte()?,
                }
            }
            other => {
                return Err(ProtocolError::UnknownCommand {
                    command: ids::CMD_SET_VEHICLE_VARIABLE,
                    subcommand: other,
                })
            }
        };

        Ok(command)
    }
}

fn expect_variable(reader: &mut Reader<'_>, command_id: u8, expected: u8) -> Result<()> {
    let found = reader.decode_byte()?;
    if found != expected {
        return Err(ProtocolError::UnknownCommand {
            command: command_id,
            subcommand: found,
        });
    }
    Ok(())
}
