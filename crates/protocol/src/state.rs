//! Session state machine
//!
//! State transitions:
//! ```text
//! DISCONNECTED → CONNECTING → READY
//!       ↑             ↓         ↓
//!       └─────────────┴─────────┘
//!   (connect failure, close, end of simulation, transport error)
//! ```

use crate::error::{ProtocolError, Result};

/// Connection state of a simulator session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection established
    #[default]
    Disconnected,

    /// TCP connect in progress
    Connecting,

    /// Connected, commands may be sent
    Ready,
}

impl SessionState {
    /// Validates a state transition
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Disconnected, Connecting) => true,

            (Connecting, Ready) => true,
            (Connecting, Disconnected) => true, // connect failed

            (Ready, Disconnected) => true,

            (a, b) if a == &b => true,

            _ => false,
        }
    }

    /// Attempts to transition to a new state
    ///
    /// Returns Ok(()) if transition is valid, Err otherwise
    pub fn transition_to(&mut self, next: SessionState) -> Result<()> {
        if self.can_transition_to(next) {
            *self = next;
            Ok(())
        } else {
            Err(ProtocolError::InvalidStateTransition {
                from: *self,
                to: next,
            })
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, SessionState::Disconnected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Ready => write!(f, "Ready"),
        }
    }
}
