//! Connection registry.
//!
//! Tracks live sessions for the driver: when they connected, when they were
//! last active, and how many requests they sent.

use std::{collections::HashMap, time::Instant};

/// State kept per connected session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session id assigned by the transport
    pub session_id: u64,
    /// When the connection was accepted
    pub connected_at: Instant,
    /// When the last frame arrived
    pub last_activity: Instant,
    /// Requests received so far
    pub requests: u64,
}

/// Live sessions keyed by id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<u64, SessionInfo>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns `false` if the id is already taken.
    pub fn register(&mut self, session_id: u64, now: Instant) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }
        self.sessions.insert(
            session_id,
            SessionInfo { session_id, connected_at: now, last_activity: now, requests: 0 },
        );
        true
    }

    /// Remove a session, returning its final state.
    pub fn unregister(&mut self, session_id: u64) -> Option<SessionInfo> {
        self.sessions.remove(&session_id)
    }

    /// Record a request on a session. Returns `false` for unknown sessions.
    pub fn touch(&mut self, session_id: u64, now: Instant) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(info) => {
                info.last_activity = now;
                info.requests = info.requests.saturating_add(1);
                true
            },
            None => false,
        }
    }

    /// Look up a session.
    pub fn get(&self, session_id: u64) -> Option<&SessionInfo> {
        self.sessions.get(&session_id)
    }

    /// Whether a session is registered.
    pub fn contains(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
