use std::time::Duration;

use thiserror::Error;
use traclink_protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("Session is not connected")]
    NotConnected,

    #[error("Failed to write to simulator: {0}")]
    TransportWrite(#[source] std::io::Error),

    #[error("Failed to read from simulator: {0}")]
    TransportRead(#[source] std::io::Error),

    #[error("No response from simulator within {0:?}")]
    ReadTimeout(Duration),

    #[error("Simulator closed the connection")]
    ConnectionClosed,

    #[error("Corrupted response stream: {0}")]
    CorruptedStream(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Simulator rejected command {command:#04x}: {description}")]
    Simulator { command: u8, description: String },
}

impl ClientError {
    /// Errors after which the byte stream can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::TransportWrite(_)
                | ClientError::TransportRead(_)
                | ClientError::ReadTimeout(_)
                | ClientError::ConnectionClosed
                | ClientError::CorruptedStream(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
