//! Routing from inbound chat messages to session operations.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::channel::ChatTransport;
use crate::config::Messages;
use crate::error::GemBridgeError;
use crate::manager::SessionManager;
use crate::message::{InboundMessage, MessageContent};

const REACT_WORKING: &str = "\u{23f1}\u{fe0f}";
const REACT_DONE: &str = "\u{2705}";

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Other(String),
}

impl Command {
    /// Parse a command from message text. Returns `None` for plain text
    /// that does not begin with the command prefix. A bare prefix is a
    /// command attempt too, parsed as an empty `Other`.
    pub fn parse(text: &str, prefix: &str) -> Option<Command> {
        let rest = text.trim().strip_prefix(prefix)?;
        let word = rest.split_whitespace().next().unwrap_or("");
        match word.to_lowercase().as_str() {
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            other => Some(Command::Other(other.to_string())),
        }
    }
}

/// Turns inbound messages into manager calls and sends the replies back.
///
/// The dispatcher owns the conversational etiquette: reactions while a
/// reply is in flight, user-facing notices for recoverable errors, and
/// staying silent toward users who never opened a session.
pub struct Dispatcher {
    manager: Arc<SessionManager>,
    transport: Arc<dyn ChatTransport>,
    messages: Messages,
    prefix: String,
}

impl Dispatcher {
    pub fn new(
        manager: Arc<SessionManager>,
        transport: Arc<dyn ChatTransport>,
        messages: Messages,
        prefix: &str,
    ) -> Self {
        Self {
            manager,
            transport,
            messages,
            prefix: prefix.to_string(),
        }
    }

    pub async fn dispatch(&self, msg: &InboundMessage) {
        match &msg.content {
            MessageContent::Text { text } => match Command::parse(text, &self.prefix) {
                Some(Command::Start | Command::Stop) if msg.is_group => {
                    self.send_error(msg, GemBridgeError::GroupNotSupported).await;
                }
                Some(Command::Start) => self.handle_start(msg).await,
                Some(Command::Stop) => self.handle_stop(msg).await,
                Some(Command::Other(word)) => {
                    debug!("Ignoring unknown command {}{} from {}", self.prefix, word, msg.sender_id);
                }
                None => self.handle_text(msg, text).await,
            },
            MessageContent::Image { image, caption } => {
                self.handle_image(msg, image.clone(), caption).await;
            }
            MessageContent::Unsupported => {
                debug!("Ignoring unsupported message from {}", msg.sender_id);
            }
        }
    }

    async fn handle_start(&self, msg: &InboundMessage) {
        self.react(msg, REACT_WORKING).await;
        match self.manager.open(&msg.sender_id).await {
            Ok(reply) => {
                self.react(msg, REACT_DONE).await;
                self.send(&msg.chat_id, &reply).await;
            }
            Err(e) => self.send_error(msg, e).await,
        }
    }

    async fn handle_stop(&self, msg: &InboundMessage) {
        match self.manager.close(&msg.sender_id).await {
            Ok(()) => self.send(&msg.chat_id, &self.messages.left_session).await,
            Err(e) => self.send_error(msg, e).await,
        }
    }

    async fn handle_text(&self, msg: &InboundMessage, text: &str) {
        if msg.is_group {
            return;
        }
        if !self.sender_is_active(msg).await {
            debug!("Ignoring text from {} with no open session", msg.sender_id);
            return;
        }

        self.react(msg, REACT_WORKING).await;
        match self.manager.converse(&msg.sender_id, text).await {
            Ok(reply) => {
                self.react(msg, REACT_DONE).await;
                self.send(&msg.chat_id, &reply).await;
            }
            Err(e) => self.send_error(msg, e).await,
        }
    }

    async fn handle_image(
        &self,
        msg: &InboundMessage,
        image: Option<crate::message::ImageAttachment>,
        caption: &str,
    ) {
        if msg.is_group {
            return;
        }
        if !self.sender_is_active(msg).await {
            debug!("Ignoring image from {} with no open session", msg.sender_id);
            return;
        }

        self.react(msg, REACT_WORKING).await;
        match self
            .manager
            .converse_with_image(&msg.sender_id, image, caption)
            .await
        {
            Ok(reply) => {
                self.react(msg, REACT_DONE).await;
                self.send(&msg.chat_id, &reply).await;
            }
            Err(e) => self.send_error(msg, e).await,
        }
    }

    /// Pre-check so strangers never get a reaction or a reply. The manager
    /// re-checks under its own lock, so this is a courtesy, not a guard.
    async fn sender_is_active(&self, msg: &InboundMessage) -> bool {
        match self.manager.is_active(&msg.sender_id).await {
            Ok(active) => active,
            Err(e) => {
                error!("Failed to check session for {}: {}", msg.sender_id, e);
                false
            }
        }
    }

    async fn send_error(&self, msg: &InboundMessage, err: GemBridgeError) {
        let notice = match err {
            GemBridgeError::SessionNotActive => {
                debug!("Dropping message from {}: no active session", msg.sender_id);
                return;
            }
            GemBridgeError::NotRegistered => &self.messages.not_registered,
            GemBridgeError::AlreadyActive => &self.messages.already_active,
            GemBridgeError::GroupNotSupported => &self.messages.group_not_supported,
            GemBridgeError::MediaUnavailable => &self.messages.media_failed,
            other => {
                error!("Exchange with {} failed: {}", msg.sender_id, other);
                &self.messages.failure
            }
        };
        self.send(&msg.chat_id, notice).await;
    }

    async fn send(&self, chat_id: &str, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            error!("Failed to send message to {}: {}", chat_id, e);
        }
    }

    async fn react(&self, msg: &InboundMessage, emoji: &str) {
        if let Err(e) = self.transport.react(&msg.chat_id, &msg.id, emoji).await {
            warn!("Failed to react in {}: {}", msg.chat_id, e);
        }
    }
}
