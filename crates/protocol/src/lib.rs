//! # traclink protocol
//!
//! Wire format of the simulator's remote-control protocol.
//!
//! This crate provides:
//! - [`value`]: big-endian tagged value codec and the [`Reader`] cursor
//! - [`Command`]: every supported request, with encoding and validation
//! - [`frame`]: packet framing with short and extended block headers
//! - [`response`]: status and result block decoding
//! - [`SessionState`]: connection state machine
//!
//! No function in this crate performs I/O.
//!
//! ## Example
//!
//! ```
//! use traclink_protocol::{response, Command, Outcome, Status};
//!
//! let command = Command::GetEdgeIds;
//! let packet = command.to_packet().unwrap();
//! assert_eq!(&packet[..6], &[0, 0, 0, 11, 7, 0xaa]);
//!
//! // A reply carrying a string list
//! let reply = response::encode_response(
//!     &command,
//!     &Status::ok(command.id()),
//!     Some(&response::ResultValue::StringList(vec!["e0".into()])),
//! )
//! .unwrap();
//!
//! let edges = response::decode_string_list(&reply, &command).unwrap();
//! assert_eq!(edges, Outcome::Success(vec!["e0".to_string()]));
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod response;
pub mod state;
pub mod value;

pub use command::{Command, EdgeWeight, VehicleTypeVariable, VehicleVariable};
pub use error::{ProtocolError, Result};
pub use frame::{frame, unframe};
pub use response::{Outcome, Position, Status, VariableValue, Version};
pub use state::SessionState;
pub use value::{Reader, ValueType};
