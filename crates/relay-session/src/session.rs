//! Session data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session identifier, as sent in the `MCP-Session-ID` header.
pub type SessionId = String;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered, no chunk emitted yet.
    Created,
    /// A response is being streamed.
    Active,
    /// Every response streamed on the session has finished.
    Closed,
}

/// Server-side record of one streaming client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Last event id the client reported or the server emitted.
    pub last_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    /// Chunks emitted over the session's lifetime; ids continue from here.
    pub events_sent: u64,
    /// Responses currently streaming on this session.
    #[serde(default)]
    pub active_streams: u32,
}

impl Session {
    pub(crate) fn new(id: SessionId, last_event_id: Option<String>) -> Self {
        Self {
            id,
            last_event_id,
            created_at: Utc::now(),
            state: SessionState::Created,
            events_sent: 0,
            active_streams: 0,
        }
    }

    /// Whether the session outlived `expiry` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, expiry: chrono::TimeDelta) -> bool {
        now - self.created_at > expiry
    }
}
