use crate::error_handling::types::SessionError;
use crate::network::FlowKey;
use crate::SessionState;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: u64,
    pub source: String,
    pub destination: String,
    pub started_at: DateTime<Utc>,
    state: SessionState,
}

impl Session {
    pub fn new(id: u64, key: &FlowKey) -> Self {
        Self {
            id,
            source: key.source().to_string(),
            destination: key.destination().to_string(),
            started_at: Utc::now(),
            state: SessionState::Active,
        }
    }

    /// Time since the flow was first seen.
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves the session forward. Staying put or going back is rejected.
    pub fn advance(&mut self, next: SessionState) -> Result<(), SessionError> {
        if next <= self.state {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream {} {} -> {}", self.id, self.source, self.destination)
    }
}
