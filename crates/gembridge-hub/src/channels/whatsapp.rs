//! WhatsApp channel backed by an external bridge process.
//!
//! The bridge owns the actual WhatsApp connection and exposes a small
//! HTTP API on localhost:
//! `GET /status` (readiness), `GET /messages` (drain queued inbound
//! messages), `GET /media/{id}` (raw attachment bytes), `POST /send`
//! and `POST /react` for outbound traffic.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use gembridge_core::channel::ChatTransport;
use gembridge_core::dispatcher::Dispatcher;
use gembridge_core::error::{GemBridgeError, Result};
use gembridge_core::message::{ImageAttachment, InboundMessage, MessageContent};

/// WhatsApp bridge configuration.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Base URL of the bridge process.
    pub bridge_url: String,
    /// Allowed sender JIDs (empty = allow everyone).
    pub allowed_numbers: Vec<String>,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

/// WhatsApp channel, runs as a polling service against the bridge.
pub struct WhatsAppChannel {
    bridge_url: String,
    client: Client,
    allowed_numbers: Option<HashSet<String>>,
    poll_interval_ms: u64,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Self {
        let allowed_numbers = if config.allowed_numbers.is_empty() {
            None
        } else {
            Some(config.allowed_numbers.into_iter().collect())
        };

        Self {
            bridge_url: config.bridge_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            allowed_numbers,
            poll_interval_ms: config.poll_interval_ms,
            shutdown_tx: None,
        }
    }

    /// Outbound transport sharing this channel's HTTP client.
    pub fn transport(&self) -> WhatsAppTransport {
        WhatsAppTransport {
            bridge_url: self.bridge_url.clone(),
            client: self.client.clone(),
        }
    }

    /// Whether the bridge has an authenticated WhatsApp connection.
    pub async fn check_ready(&self) -> Result<bool> {
        let url = format!("{}/status", self.bridge_url);
        let resp: StatusResponse = self.client.get(&url).send().await?.json().await?;
        Ok(resp.ready)
    }

    /// Start polling the bridge. Runs in background, returns immediately.
    ///
    /// An unreachable bridge is fatal; a reachable bridge that has not
    /// paired yet only logs a warning, it becomes ready on its own.
    pub async fn start(&mut self, dispatcher: Arc<Dispatcher>) -> Result<()> {
        if self.check_ready().await? {
            info!("🤖 WhatsApp bridge ready at {}", self.bridge_url);
        } else {
            warn!(
                "WhatsApp bridge at {} is not paired yet, polling anyway",
                self.bridge_url
            );
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let client = self.client.clone();
        let bridge_url = self.bridge_url.clone();
        let allowed_numbers = self.allowed_numbers.clone();
        let poll_interval_ms = self.poll_interval_ms;

        tokio::spawn(async move {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("WhatsApp channel shutting down...");
                    break;
                }

                match fetch_messages(&client, &bridge_url).await {
                    Ok(messages) => {
                        for wa_msg in messages {
                            if let Some(allowed) = &allowed_numbers
                                && !allowed.contains(wa_msg.sender_id())
                            {
                                warn!("Blocked sender: {}", wa_msg.sender_id());
                                continue;
                            }

                            let preview: String = wa_msg.body.chars().take(80).collect();
                            info!("📨 [{}] {}: {}", wa_msg.from, wa_msg.sender_name(), preview);

                            let inbound = into_inbound(&client, &bridge_url, wa_msg).await;
                            dispatcher.dispatch(&inbound).await;
                        }
                        tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
                    }
                    Err(e) => {
                        error!("Bridge poll error: {}. Retrying in 5s...", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop the polling loop.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

/// Outbound side of the bridge API.
#[derive(Clone)]
pub struct WhatsAppTransport {
    bridge_url: String,
    client: Client,
}

impl WhatsAppTransport {
    pub fn new(bridge_url: &str) -> Self {
        Self {
            bridge_url: bridge_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl ChatTransport for WhatsAppTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/send", self.bridge_url);
        let body = SendBody {
            to: chat_id.to_string(),
            message: text.to_string(),
        };

        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(GemBridgeError::Upstream(format!(
                "Bridge send failed ({})",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn react(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        let url = format!("{}/react", self.bridge_url);
        let body = ReactBody {
            to: chat_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        };

        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(GemBridgeError::Upstream(format!(
                "Bridge react failed ({})",
                resp.status()
            )));
        }
        Ok(())
    }
}

// ─── Bridge API Types ──────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaMessage {
    id: String,
    /// Chat JID. For group messages this is the group, not the sender.
    from: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    is_group: bool,
    sender_name: Option<String>,
    /// Sender JID inside a group chat.
    participant: Option<String>,
    media_id: Option<String>,
    media_type: Option<String>,
}

impl WaMessage {
    fn sender_id(&self) -> &str {
        self.participant.as_deref().unwrap_or(&self.from)
    }

    fn sender_name(&self) -> &str {
        self.sender_name.as_deref().unwrap_or("Unknown")
    }
}

#[derive(Debug, Serialize)]
struct SendBody {
    to: String,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReactBody {
    to: String,
    message_id: String,
    emoji: String,
}

// ─── API Helpers ───────────────────────────────────────────

async fn fetch_messages(client: &Client, bridge_url: &str) -> Result<Vec<WaMessage>> {
    let url = format!("{}/messages", bridge_url);
    let resp = client.get(&url).send().await?;
    if !resp.status().is_success() {
        return Err(GemBridgeError::Upstream(format!(
            "Bridge poll failed ({})",
            resp.status()
        )));
    }
    Ok(resp.json().await?)
}

async fn fetch_media(client: &Client, bridge_url: &str, media_id: &str) -> Result<String> {
    let url = format!("{}/media/{}", bridge_url, media_id);
    let resp = client.get(&url).send().await?;
    if !resp.status().is_success() {
        return Err(GemBridgeError::Upstream(format!(
            "Media download failed ({})",
            resp.status()
        )));
    }
    let bytes = resp.bytes().await?;
    Ok(BASE64_STANDARD.encode(&bytes))
}

/// Classify a bridge message and fetch its media, if any.
///
/// A failed image download still yields an `Image` message, with the
/// attachment missing, so the dispatcher can apologize to the sender
/// instead of dropping the message on the floor.
async fn into_inbound(client: &Client, bridge_url: &str, msg: WaMessage) -> InboundMessage {
    let content = match (&msg.media_id, &msg.media_type) {
        (Some(id), Some(mime)) if mime.starts_with("image/") => {
            let image = match fetch_media(client, bridge_url, id).await {
                Ok(data) => Some(ImageAttachment {
                    mime_type: mime.clone(),
                    data,
                }),
                Err(e) => {
                    warn!("Failed to fetch media {}: {}", id, e);
                    None
                }
            };
            MessageContent::Image {
                image,
                caption: msg.body.clone(),
            }
        }
        (Some(_), _) => MessageContent::Unsupported,
        (None, _) => MessageContent::Text {
            text: msg.body.clone(),
        },
    };

    let sender_id = msg.sender_id().to_string();
    InboundMessage {
        id: msg.id,
        sender_id,
        chat_id: msg.from,
        content,
        is_group: msg.is_group,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn wa_text(id: &str, from: &str, body: &str) -> WaMessage {
        WaMessage {
            id: id.to_string(),
            from: from.to_string(),
            body: body.to_string(),
            is_group: false,
            sender_name: Some("Alice".to_string()),
            participant: None,
            media_id: None,
            media_type: None,
        }
    }

    #[tokio::test]
    async fn test_send_posts_to_bridge() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(json!({
                "to": "123@s.whatsapp.net",
                "message": "hello"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = WhatsAppTransport::new(&server.uri());
        transport
            .send_text("123@s.whatsapp.net", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_react_posts_emoji() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/react"))
            .and(body_json(json!({
                "to": "123@s.whatsapp.net",
                "messageId": "m-1",
                "emoji": "✅"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = WhatsAppTransport::new(&server.uri());
        transport
            .react("123@s.whatsapp.net", "m-1", "✅")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = WhatsAppTransport::new(&server.uri());
        let err = transport.send_text("123", "hello").await.unwrap_err();
        assert!(matches!(err, GemBridgeError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_image_message_fetches_and_encodes_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/m-77"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"hello".to_vec())
                    .insert_header("Content-Type", "image/jpeg"),
            )
            .mount(&server)
            .await;

        let mut msg = wa_text("m-77", "123@s.whatsapp.net", "check this out");
        msg.media_id = Some("m-77".to_string());
        msg.media_type = Some("image/jpeg".to_string());

        let inbound = into_inbound(&Client::new(), &server.uri(), msg).await;
        match inbound.content {
            MessageContent::Image {
                image: Some(attachment),
                caption,
            } => {
                assert_eq!(attachment.mime_type, "image/jpeg");
                assert_eq!(attachment.data, "aGVsbG8=");
                assert_eq!(caption, "check this out");
            }
            other => panic!("expected image content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_media_still_yields_image_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut msg = wa_text("m-1", "123@s.whatsapp.net", "");
        msg.media_id = Some("m-1".to_string());
        msg.media_type = Some("image/png".to_string());

        let inbound = into_inbound(&Client::new(), &server.uri(), msg).await;
        assert!(matches!(
            inbound.content,
            MessageContent::Image { image: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_group_message_maps_participant_and_chat() {
        let mut msg = wa_text("m-1", "group-9@g.us", "hi all");
        msg.is_group = true;
        msg.participant = Some("456@s.whatsapp.net".to_string());

        let inbound = into_inbound(&Client::new(), "http://localhost:0", msg).await;
        assert!(inbound.is_group);
        assert_eq!(inbound.chat_id, "group-9@g.us");
        assert_eq!(inbound.sender_id, "456@s.whatsapp.net");
        assert!(matches!(inbound.content, MessageContent::Text { .. }));
    }

    #[tokio::test]
    async fn test_non_image_media_is_unsupported() {
        let mut msg = wa_text("m-1", "123@s.whatsapp.net", "");
        msg.media_id = Some("m-1".to_string());
        msg.media_type = Some("audio/ogg".to_string());

        let inbound = into_inbound(&Client::new(), "http://localhost:0", msg).await;
        assert!(matches!(inbound.content, MessageContent::Unsupported));
    }

    #[tokio::test]
    async fn test_check_ready_reads_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": false})))
            .mount(&server)
            .await;

        let channel = WhatsAppChannel::new(WhatsAppConfig {
            bridge_url: server.uri(),
            allowed_numbers: Vec::new(),
            poll_interval_ms: 2000,
        });
        assert!(!channel.check_ready().await.unwrap());
    }
}
