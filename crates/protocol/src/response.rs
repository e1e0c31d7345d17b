//! Response decoding
//!
//! A response is a length-prefixed packet holding a status block and, for
//! successful queries, a result block:
//!
//! ```text
//! status block │ len │ command_id │ u8 result │ string description
//! result block │ len │ response_id │ u8 variable │ string object_id │ u8 tag │ value
//! ```
//!
//! Each `decode_*` function reads the status first. A non-success status is
//! returned as [`Outcome::Failed`] and the result block is never touched.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::{ProtocolError, Result};
use crate::frame;
use crate::value::{self, Reader, ValueType};

/// Result code of a successful command
pub const RESULT_OK: u8 = 0x00;

/// Result code for commands the simulator does not implement
pub const RESULT_NOT_IMPLEMENTED: u8 = 0x01;

/// Result code for commands the simulator rejected
pub const RESULT_ERR: u8 = 0xFF;

/// Decoded status block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Echo of the request's command id
    pub command_id: u8,
    pub result: u8,
    pub description: String,
}

impl Status {
    pub fn ok(command_id: u8) -> Self {
        Self {
            command_id,
            result: RESULT_OK,
            description: String::new(),
        }
    }

    pub fn error(command_id: u8, description: impl Into<String>) -> Self {
        Self {
            command_id,
            result: RESULT_ERR,
            description: description.into(),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.result == RESULT_OK
    }
}

/// Either a decoded value or the status explaining why none is available
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failed(Status),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failed(status) => Outcome::Failed(status),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, Status> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failed(status) => Err(status),
        }
    }
}

/// Cartesian network coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Simulator protocol and software version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub api_version: i32,
    pub software: String,
}

/// Value of a per-vehicle variable, typed by the result tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableValue {
    Str(String),
    Int(i32),
}

impl VariableValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariableValue::Str(value) => Some(value),
            VariableValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            VariableValue::Int(value) => Some(*value),
            VariableValue::Str(_) => None,
        }
    }
}

/// Reads the length prefix and status block
///
/// Returns the status and the offset at which a result block would start.
pub fn decode_status(response: &[u8], command_id: u8) -> Result<(Status, usize)> {
    let mut reader = Reader::new(response);

    let total = frame::read_length_prefix(&mut reader)?;
    if total > response.len() {
        return Err(ProtocolError::TruncatedResponse {
            need: total,
            have: response.len(),
        });
    }
    if total < response.len() {
        return Err(ProtocolError::FrameLength(total as i64));
    }

    let (echoed, body) = frame::decode_block(&mut reader)?;
    if echoed != command_id {
        return Err(ProtocolError::mismatch("status command", command_id, echoed));
    }

    let mut body = Reader::new(body);
    let result = body.decode_byte()?;
    let description = body.decode_string()?;

    Ok((
        Status {
            command_id: echoed,
            result,
            description,
        },
        reader.position(),
    ))
}

/// Decodes a status-only response
///
/// Any bytes after the status block are ignored.
pub fn decode_ack(response: &[u8], command_id: u8) -> Result<Outcome<()>> {
    let (status, _) = decode_status(response, command_id)?;
    if status.is_success() {
        Ok(Outcome::Success(()))
    } else {
        Ok(Outcome::Failed(status))
    }
}

fn decode_result<T>(
    response: &[u8],
    command: &Command,
    decode_value: impl FnOnce(&mut Reader<'_>) -> Result<T>,
) -> Result<Outcome<T>> {
    let (status, offset) = decode_status(response, command.id())?;
    if !status.is_success() {
        return Ok(Outcome::Failed(status));
    }

    let expected_id = command.response_id().ok_or_else(|| {
        ProtocolError::invalid(format!(
            "command {:#04x} does not produce a result block",
            command.id()
        ))
    })?;

    let mut reader = Reader::at(response, offset)?;
    let (response_id, body) = frame::decode_block(&mut reader)?;
    // Some simulators echo the plain command id instead of the response id
    if response_id != expected_id && response_id != command.id() {
        return Err(ProtocolError::mismatch(
            "response command",
            expected_id,
            response_id,
        ));
    }

    let mut body = Reader::new(body);
    if let Some(expected_variable) = command.variable() {
        let variable = body.decode_byte()?;
        if variable != expected_variable {
            return Err(ProtocolError::mismatch(
                "variable",
                expected_variable,
                variable,
            ));
        }
        body.decode_string()?;
    }

    decode_value(&mut body).map(Outcome::Success)
}

/// Decodes a 2D position result (tag `0x01`, x, y)
pub fn decode_position(response: &[u8], command: &Command) -> Result<Outcome<Position>> {
    decode_result(response, command, |reader| {
        reader.expect_tag(ValueType::Position2D)?;
        Ok(Position {
            x: reader.decode_float64()?,
            y: reader.decode_float64()?,
        })
    })
}

/// Decodes a string-list result (tag `0x0E`)
pub fn decode_string_list(response: &[u8], command: &Command) -> Result<Outcome<Vec<String>>> {
    decode_result(response, command, |reader| reader.decode_tagged_string_list())
}

/// Decodes a float64 result (tag `0x0B`)
pub fn decode_scalar_double(response: &[u8], command: &Command) -> Result<Outcome<f64>> {
    decode_result(response, command, |reader| reader.decode_tagged_float64())
}

/// Decodes a string (`0x0C`) or int32 (`0x09`) result, depending on the tag
pub fn decode_scalar_string_or_int(
    response: &[u8],
    command: &Command,
) -> Result<Outcome<VariableValue>> {
    decode_result(response, command, |reader| {
        let tag = reader.decode_tag()?;
        match ValueType::from_tag(tag) {
            Some(ValueType::String) => Ok(VariableValue::Str(reader.decode_string()?)),
            Some(ValueType::Int) => Ok(VariableValue::Int(reader.decode_int32()?)),
            _ => Err(ProtocolError::mismatch(
                "value type",
                ValueType::String.tag(),
                tag,
            )),
        }
    })
}

/// Decodes the answer to [`Command::GetVersion`]
pub fn decode_version(response: &[u8]) -> Result<Outcome<Version>> {
    decode_result(response, &Command::GetVersion, |reader| {
        Ok(Version {
            api_version: reader.decode_int32()?,
            software: reader.decode_string()?,
        })
    })
}

/// Result block content, as produced by the simulator
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Position(Position),
    StringList(Vec<String>),
    Double(f64),
    Variable(VariableValue),
    Version(Version),
}

/// Encodes a complete response packet
///
/// `result` is only written when `status` is a success. The result block
/// takes its id and variable from `command`.
pub fn encode_response(
    command: &Command,
    status: &Status,
    result: Option<&ResultValue>,
) -> Result<Bytes> {
    let mut blocks = BytesMut::with_capacity(64);

    let mut body = BytesMut::new();
    value::encode_byte(&mut body, status.result);
    value::encode_string(&mut body, &status.description)?;
    frame::encode_block(&mut blocks, status.command_id, &body);

    let result_block = match (result, command.response_id()) {
        (Some(result), Some(response_id)) if status.is_success() => Some((result, response_id)),
        _ => None,
    };

    if let Some((result, response_id)) = result_block {
        let mut body = BytesMut::new();
        if let Some(variable) = command.variable() {
            value::encode_byte(&mut body, variable);
            value::encode_string(&mut body, object_id(command))?;
        }

        match result {
            ResultValue::Position(position) => {
                value::encode_tag(&mut body, ValueType::Position2D);
                value::encode_float64(&mut body, position.x);
                value::encode_float64(&mut body, position.y);
            }
            ResultValue::StringList(items) => value::encode_tagged_string_list(&mut body, items)?,
            ResultValue::Double(number) => value::encode_tagged_float64(&mut body, *number),
            ResultValue::Variable(VariableValue::Str(text)) => {
                value::encode_tagged_string(&mut body, text)?
            }
            ResultValue::Variable(VariableValue::Int(number)) => {
                value::encode_tagged_int32(&mut body, *number)
            }
            ResultValue::Version(version) => {
                value::encode_int32(&mut body, version.api_version);
                value::encode_string(&mut body, &version.software)?;
            }
        }

        frame::encode_block(&mut blocks, response_id, &body);
    }

    Ok(frame::with_length_prefix(&blocks))
}

fn object_id(command: &Command) -> &str {
    match command {
        Command::GetVehicleTypeVariable { vehicle_type, .. } => vehicle_type,
        Command::GetVehicleVariable { vehicle_id, .. } => vehicle_id,
        Command::GetRouteEdges { route_id } => route_id,
        _ => "",
    }
}
