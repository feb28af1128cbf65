//! Chat transport trait: the outbound side of a chat platform adapter.

use async_trait::async_trait;

use crate::error::Result;

/// Outbound chat transport, implement this for each chat platform.
///
/// # Example
///
/// ```rust,ignore
/// struct MyTransport;
///
/// #[async_trait]
/// impl ChatTransport for MyTransport {
///     async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
///         /* send */ Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message to a chat.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;

    /// React to a message with an emoji. Best effort; platforms without
    /// reactions keep the default no-op.
    async fn react(&self, _chat_id: &str, _message_id: &str, _emoji: &str) -> Result<()> {
        Ok(())
    }
}
