//! Session state: per-user activity flag, last activity time, and history.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Turn;

/// Conversation state for a single user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Stable chat identifier (WhatsApp JID).
    pub user_id: String,
    /// Whether the conversation is currently open.
    pub active: bool,
    /// Timestamp of the last exchange.
    pub last_active_at: DateTime<Utc>,
    /// Full conversation history, oldest first. Never trimmed in place;
    /// trimming only applies to the outbound context window.
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl Session {
    /// Create a fresh active session.
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            active: true,
            last_active_at: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Record one full exchange and refresh the activity timestamp.
    pub fn push_exchange(&mut self, user_turn: Turn, assistant_turn: Turn) {
        self.history.push(user_turn);
        self.history.push(assistant_turn);
        self.last_active_at = Utc::now();
    }

    /// Whether the session has been idle longer than `timeout`.
    pub fn idle_longer_than(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_active_at > timeout
    }
}

/// All known sessions, keyed by user id.
///
/// Ordered map so saved snapshots and sweep results are deterministic.
pub type SessionMap = BTreeMap<String, Session>;
