//! Configuration management for GemBridge.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GemBridgeError, Result};
use crate::provider::ProviderConfig;

/// Top-level GemBridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GemBridgeConfig {
    /// Model provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// WhatsApp bridge settings.
    #[serde(default)]
    pub whatsapp: WhatsAppSettings,

    /// User-visible reply strings.
    #[serde(default)]
    pub messages: Messages,
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Maximum turns sent upstream per request.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Seconds of inactivity before an open session is closed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds between idle sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Prompt sent on behalf of a user opening a fresh session.
    #[serde(default = "default_greeting_prompt")]
    pub greeting_prompt: String,

    /// Prompt sent on behalf of a user resuming an idle session.
    #[serde(default = "default_resume_prompt")]
    pub resume_prompt: String,
}

fn default_max_history() -> usize {
    10
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    3
}

fn default_greeting_prompt() -> String {
    "Hello! Briefly introduce yourself as an AI assistant and ask how you can help.".to_string()
}

fn default_resume_prompt() -> String {
    "I'm back. Greet me again briefly, keeping our earlier conversation in mind.".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            greeting_prompt: default_greeting_prompt(),
            resume_prompt: default_resume_prompt(),
        }
    }
}

/// WhatsApp bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppSettings {
    /// Base URL of the HTTP bridge.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Allowed phone numbers (empty = allow everyone).
    #[serde(default)]
    pub allowed_numbers: Vec<String>,

    /// Command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_bridge_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_prefix() -> String {
    "/".to_string()
}

impl Default for WhatsAppSettings {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            poll_interval_ms: default_poll_interval_ms(),
            allowed_numbers: Vec::new(),
            prefix: default_prefix(),
        }
    }
}

/// User-visible reply strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default = "default_group_not_supported")]
    pub group_not_supported: String,

    #[serde(default = "default_not_registered")]
    pub not_registered: String,

    #[serde(default = "default_already_active")]
    pub already_active: String,

    #[serde(default = "default_left_session")]
    pub left_session: String,

    #[serde(default = "default_idle_closed")]
    pub idle_closed: String,

    #[serde(default = "default_media_failed")]
    pub media_failed: String,

    #[serde(default = "default_failure")]
    pub failure: String,
}

fn default_group_not_supported() -> String {
    "Sessions can only be started in a direct chat.".to_string()
}

fn default_not_registered() -> String {
    "You don't have an open session. Send /start to begin.".to_string()
}

fn default_already_active() -> String {
    "You already have an open session. Just send a message.".to_string()
}

fn default_left_session() -> String {
    "Session closed. See you next time!".to_string()
}

fn default_idle_closed() -> String {
    "Your session was closed due to inactivity. Send /start to chat again.".to_string()
}

fn default_media_failed() -> String {
    "I couldn't download that image. Please send it again.".to_string()
}

fn default_failure() -> String {
    "Something went wrong. Please try again.".to_string()
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            group_not_supported: default_group_not_supported(),
            not_registered: default_not_registered(),
            already_active: default_already_active(),
            left_session: default_left_session(),
            idle_closed: default_idle_closed(),
            media_failed: default_media_failed(),
            failure: default_failure(),
        }
    }
}

impl GemBridgeConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| GemBridgeError::Config(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| GemBridgeError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GemBridgeError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gembridge")
            .join("config.toml")
    }
}
