//! Session lifecycle: opening, closing, conversing, and idle cleanup.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SessionSettings;
use crate::error::{GemBridgeError, Result};
use crate::history::context_window;
use crate::message::{ImageAttachment, Turn};
use crate::provider::LlmProvider;
use crate::session::{Session, SessionMap};
use crate::store::SessionStore;

/// Session lifecycle manager.
///
/// Every operation runs a full load, mutate, save cycle against the store
/// under one async lock, so concurrent chats and the idle sweeper never
/// lose each other's updates. Nothing is persisted until an operation has
/// fully succeeded; a failed model call leaves both the store and the
/// history exactly as they were.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn LlmProvider>,
    settings: SessionSettings,
    lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn LlmProvider>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
            lock: Mutex::new(()),
        }
    }

    /// Open a session, or resume one that went idle.
    ///
    /// Sends the configured greeting prompt (or the resume prompt, over the
    /// retained history) and returns the model's reply. Opening a session
    /// that is already active is an error.
    pub async fn open(&self, user_id: &str) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.store.load().await?;

        let prompt = match sessions.get(user_id) {
            Some(s) if s.active => return Err(GemBridgeError::AlreadyActive),
            Some(_) => self.settings.resume_prompt.clone(),
            None => self.settings.greeting_prompt.clone(),
        };

        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Session::new(user_id));
        session.active = true;

        let turn = Turn::user(&prompt);
        let context = context_window(&session.history, self.settings.max_history);
        let reply = self.provider.generate(&context, &turn).await?;

        session.push_exchange(turn, Turn::assistant(&reply));
        self.store.save(&sessions).await?;

        info!("Session opened for {}", user_id);
        Ok(reply)
    }

    /// Close an active session. The history is retained for a later resume.
    pub async fn close(&self, user_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.store.load().await?;

        match sessions.get_mut(user_id) {
            Some(s) if s.active => s.active = false,
            _ => return Err(GemBridgeError::NotRegistered),
        }

        self.store.save(&sessions).await?;
        info!("Session closed for {}", user_id);
        Ok(())
    }

    /// Run one conversational exchange for an active session.
    pub async fn converse(&self, user_id: &str, text: &str) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.store.load().await?;

        let reply = self.exchange(&mut sessions, user_id, Turn::user(text)).await?;
        self.store.save(&sessions).await?;
        Ok(reply)
    }

    /// Run one exchange where the user sent an image with an optional
    /// caption. `image` is `None` when the transport failed to fetch the
    /// media; that is only reported to users with an active session.
    pub async fn converse_with_image(
        &self,
        user_id: &str,
        image: Option<ImageAttachment>,
        caption: &str,
    ) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.store.load().await?;

        if !sessions.get(user_id).map(|s| s.active).unwrap_or(false) {
            return Err(GemBridgeError::SessionNotActive);
        }
        let image = image.ok_or(GemBridgeError::MediaUnavailable)?;

        let turn = Turn::user_with_image(&image.mime_type, &image.data, caption);
        let reply = self.exchange(&mut sessions, user_id, turn).await?;
        self.store.save(&sessions).await?;
        Ok(reply)
    }

    /// Whether the user currently has an open session.
    pub async fn is_active(&self, user_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let sessions = self.store.load().await?;
        Ok(sessions.get(user_id).map(|s| s.active).unwrap_or(false))
    }

    /// Deactivate every active session idle longer than `idle_timeout`.
    ///
    /// Saves once for the whole sweep, and only when something expired, so
    /// a frequent sweep cadence writes nothing at steady state. Returns the
    /// deactivated user ids so the caller can notify them.
    pub async fn sweep_idle(
        &self,
        now: DateTime<Utc>,
        idle_timeout: Duration,
    ) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.store.load().await?;

        let mut expired = Vec::new();
        for (user_id, session) in sessions.iter_mut() {
            if session.active && session.idle_longer_than(now, idle_timeout) {
                session.active = false;
                expired.push(user_id.clone());
            }
        }

        if !expired.is_empty() {
            self.store.save(&sessions).await?;
            info!("Closed {} idle session(s)", expired.len());
        }

        Ok(expired)
    }

    /// Shared exchange path: trim the context, call the model, and append
    /// both turns on success.
    async fn exchange(
        &self,
        sessions: &mut SessionMap,
        user_id: &str,
        turn: Turn,
    ) -> Result<String> {
        let session = match sessions.get_mut(user_id) {
            Some(s) if s.active => s,
            _ => return Err(GemBridgeError::SessionNotActive),
        };

        let context = context_window(&session.history, self.settings.max_history);
        debug!(
            "Sending {} of {} stored turn(s) for {}",
            context.len(),
            session.history.len(),
            user_id
        );

        let reply = self.provider.generate(&context, &turn).await?;
        session.push_exchange(turn, Turn::assistant(&reply));
        Ok(reply)
    }
}
