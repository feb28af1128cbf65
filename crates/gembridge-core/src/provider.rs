//! Model provider trait: the abstraction over the upstream AI API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Turn;

/// Model provider trait, implement this to swap the upstream AI service.
///
/// # Example
///
/// ```rust,ignore
/// struct MyProvider;
///
/// #[async_trait]
/// impl LlmProvider for MyProvider {
///     async fn generate(&self, context: &[Turn], turn: &Turn) -> Result<String> {
///         // Call your API here
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a reply for `turn` given the preceding conversation context.
    ///
    /// `context` holds the trimmed history, oldest first, not including
    /// `turn` itself. Implementations must enforce a request timeout so a
    /// hung upstream cannot stall the session engine.
    async fn generate(&self, context: &[Turn], turn: &Turn) -> Result<String>;
}

/// Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            api_base: None,
            request_timeout_secs: 60,
        }
    }
}
