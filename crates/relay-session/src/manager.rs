//! Session manager for streaming requests.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use relay_core::config::ServerConfig;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::session::{Session, SessionId, SessionState};

/// Session manager error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session limit reached ({0} live sessions)")]
    LimitReached(usize),
}

/// Tracks streaming sessions and reclaims them once they expire.
///
/// Expiry is measured from creation. Expired sessions are ignored on
/// lookup and removed by [`SessionManager::cleanup`], which callers run
/// on their own timer or through [`SessionManager::spawn_sweeper`].
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Session>>,
    expiry: TimeDelta,
    max_sessions: usize,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl SessionManager {
    /// Create a session manager.
    #[must_use]
    pub fn new(expiry: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            expiry: TimeDelta::from_std(expiry).unwrap_or(TimeDelta::MAX),
            max_sessions: max_sessions.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.session_expiry(), config.max_sessions)
    }

    /// Resume the session named by the client, or start a new one.
    ///
    /// Unknown or expired ids are not adopted; the client gets a fresh
    /// server-generated id instead. A reported `last_event_id` is stored
    /// on the resolved session.
    ///
    /// # Errors
    /// Returns error if a new session is needed and the table is full
    /// even after dropping expired sessions.
    pub async fn resolve(
        &self,
        requested: Option<&str>,
        last_event_id: Option<String>,
    ) -> Result<Session, SessionError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        if let Some(session) = requested
            .and_then(|id| sessions.get_mut(id))
            .filter(|s| !s.is_expired_at(now, self.expiry))
        {
            if last_event_id.is_some() {
                session.last_event_id = last_event_id;
            }
            tracing::debug!(session_id = %session.id, "Resumed session");
            return Ok(session.clone());
        }

        if sessions.len() >= self.max_sessions {
            sessions.retain(|_, s| !s.is_expired_at(now, self.expiry));
            if sessions.len() >= self.max_sessions {
                tracing::warn!(max = self.max_sessions, "Session limit reached");
                return Err(SessionError::LimitReached(self.max_sessions));
            }
        }

        if let Some(stale) = requested {
            tracing::debug!(requested = stale, "Ignoring unknown session id");
        }

        let session = Session::new(Uuid::new_v4().to_string(), last_event_id);
        sessions.insert(session.id.clone(), session.clone());
        tracing::info!(session_id = %session.id, live = sessions.len(), "Created session");
        Ok(session)
    }

    /// Get a live session by id.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|s| !s.is_expired_at(now, self.expiry))
            .cloned()
    }

    /// Register a response starting to stream on a session.
    pub async fn mark_active(&self, id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.active_streams += 1;
            session.state = SessionState::Active;
        }
    }

    /// Register a streamed response finishing.
    ///
    /// The session becomes `Closed` once no response is streaming on it.
    pub async fn close(&self, id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.active_streams = session.active_streams.saturating_sub(1);
            if session.active_streams == 0 {
                session.state = SessionState::Closed;
            }
        }
    }

    /// Allocate the next event id on a session.
    ///
    /// Ids are unique per session even when several responses stream on it
    /// at once. Returns `None` for a session reclaimed mid-stream; the
    /// stream itself is not affected.
    pub async fn next_event_id(&self, id: &str) -> Option<u64> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.events_sent += 1;
        session.last_event_id = Some(session.events_sent.to_string());
        Some(session.events_sent)
    }

    /// Remove every expired session, returning how many were removed.
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now, self.expiry));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "Cleaned up expired sessions");
        }
        removed
    }

    /// Number of stored sessions, expired ones included until cleanup.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Run [`SessionManager::cleanup`] every `interval` until aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.cleanup().await;
            }
        })
    }
}
