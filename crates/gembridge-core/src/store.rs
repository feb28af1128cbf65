//! Session store trait: whole-snapshot persistence.

use async_trait::async_trait;

use crate::error::Result;
use crate::session::SessionMap;

/// Session store trait, implement for different storage backends.
///
/// The store holds the entire session map as one snapshot. The manager
/// serializes access, so implementations only need to be crash-safe, not
/// concurrent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load all sessions. A missing backing store yields an empty map.
    async fn load(&self) -> Result<SessionMap>;

    /// Persist all sessions, replacing the previous snapshot.
    async fn save(&self, sessions: &SessionMap) -> Result<()>;
}

/// In-memory store for testing and lightweight usage.
pub struct InMemorySessionStore {
    sessions: std::sync::Mutex<SessionMap>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: std::sync::Mutex::new(SessionMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self) -> Result<SessionMap> {
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn save(&self, sessions: &SessionMap) -> Result<()> {
        *self.sessions.lock().unwrap() = sessions.clone();
        Ok(())
    }
}
