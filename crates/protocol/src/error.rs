use thiserror::Error;

use crate::state::SessionState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Truncated response: need {need} bytes, have {have}")]
    TruncatedResponse { need: usize, have: usize },

    #[error("Protocol mismatch in {field}: expected {expected:#04x}, found {found:#04x}")]
    ProtocolMismatch {
        field: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown command {command:#04x} (subcommand {subcommand:#04x})")]
    UnknownCommand { command: u8, subcommand: u8 },

    #[error("Invalid frame length: {0}")]
    FrameLength(i64),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: SessionState,
        to: SessionState,
    },
}

impl ProtocolError {
    pub(crate) fn mismatch(field: &'static str, expected: u8, found: u8) -> Self {
        Self::ProtocolMismatch {
            field,
            expected,
            found,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
