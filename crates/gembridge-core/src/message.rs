//! Message types: conversation turns and inbound chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation turn.
///
/// Serialized with the Gemini vocabulary: replies are recorded as `model`,
/// both on the wire and in the session files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(rename = "model")]
    Assistant,
}

/// One part of a turn, either plain text or inline binary data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

/// Base64-encoded media payload in the Gemini inline format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// A single turn in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text {
                text: text.to_string(),
            }],
        }
    }

    pub fn assistant(text: &str) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text {
                text: text.to_string(),
            }],
        }
    }

    /// A user turn carrying an inline image plus its caption.
    pub fn user_with_image(mime_type: &str, data_base64: &str, caption: &str) -> Self {
        Self {
            role: Role::User,
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.to_string(),
                        data: data_base64.to_string(),
                    },
                },
                Part::Text {
                    text: caption.to_string(),
                },
            ],
        }
    }

    /// Concatenated text of the turn's text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Classified content of an inbound chat message.
///
/// Classification happens once at the transport boundary, so everything
/// downstream can match on the shape instead of sniffing payloads.
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text {
        text: String,
    },
    /// An image message. `image` is `None` when the media bytes could not
    /// be retrieved from the transport.
    Image {
        image: Option<ImageAttachment>,
        caption: String,
    },
    Unsupported,
}

/// Downloaded media attached to a message.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub mime_type: String,
    /// Base64-encoded bytes, ready for the inline request format.
    pub data: String,
}

/// A message flowing in from the chat transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: MessageContent,
    pub is_group: bool,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Create a plain text message from a direct chat.
    pub fn text(sender_id: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            chat_id: sender_id.to_string(),
            content: MessageContent::Text {
                text: text.to_string(),
            },
            is_group: false,
            timestamp: Utc::now(),
        }
    }
}
