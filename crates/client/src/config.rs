use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Session configuration
///
/// Durations are (de)serialized as milliseconds. Missing fields fall back to
/// [`SessionConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,

    pub port: u16,

    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Upper bound on waiting for one response; `None` waits forever
    #[serde(with = "option_duration_ms")]
    pub read_timeout: Option<Duration>,

    /// Responses announcing a larger total length are treated as a corrupted stream
    pub max_response_len: usize,

    /// Simulated milliseconds covered by one simulator step
    pub step_length_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3456,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(30)),
            max_response_len: 16 * 1024 * 1024,
            step_length_ms: 1000,
        }
    }
}

impl SessionConfig {
    /// Configuration for a simulator at `host:port`, other fields default
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ClientError::InvalidConfig("host must not be empty".into()));
        }
        if self.step_length_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "step_length_ms must be positive".into(),
            ));
        }
        // Smallest possible response: length prefix plus an empty status block
        if self.max_response_len < 11 {
            return Err(ClientError::InvalidConfig(format!(
                "max_response_len {} cannot hold a status block",
                self.max_response_len
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
