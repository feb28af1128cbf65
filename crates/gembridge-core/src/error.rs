//! Error types for GemBridge.

use thiserror::Error;

/// Core error type for all GemBridge operations.
#[derive(Error, Debug)]
pub enum GemBridgeError {
    #[error("Session store error: {0}")]
    StoreIo(String),

    #[error("No session for this user")]
    NotRegistered,

    #[error("Session is not active")]
    SessionNotActive,

    #[error("Session is already active")]
    AlreadyActive,

    #[error("Group chats are not supported")]
    GroupNotSupported,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Media could not be retrieved")]
    MediaUnavailable,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GemBridgeError>;
