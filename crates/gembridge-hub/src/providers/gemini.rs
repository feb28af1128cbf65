//! Google Gemini provider, speaking the native generateContent API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gembridge_core::error::{GemBridgeError, Result};
use gembridge_core::message::Turn;
use gembridge_core::provider::{LlmProvider, ProviderConfig};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider.
///
/// Conversation turns already use the Gemini vocabulary (`user`/`model`
/// roles, `text` and `inlineData` parts), so requests serialize the turns
/// as-is and only wrap them in a `contents` envelope.
pub struct GeminiProvider {
    client: Client,
    config: ProviderConfig,
    api_base: String,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            config,
            api_base,
        }
    }
}

/// Internal request body.
#[derive(Serialize)]
struct ApiRequest<'a> {
    contents: Vec<&'a Turn>,
}

/// Internal response body. Every level is optional; Gemini omits fields
/// freely, for example when a safety filter eats the candidate.
#[derive(Deserialize)]
struct ApiResponse {
    candidates: Option<Vec<ApiCandidate>>,
}

#[derive(Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
}

#[derive(Deserialize)]
struct ApiContent {
    parts: Option<Vec<ApiPart>>,
}

#[derive(Deserialize)]
struct ApiPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn request_error(e: reqwest::Error) -> GemBridgeError {
    if e.is_timeout() {
        GemBridgeError::UpstreamTimeout
    } else {
        GemBridgeError::Upstream(format!("Request failed: {}", e))
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, context: &[Turn], turn: &Turn) -> Result<String> {
        let api_key = self.config.api_key.as_deref().unwrap_or("");
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.config.model, api_key
        );

        let mut contents: Vec<&Turn> = context.iter().collect();
        contents.push(turn);

        info!(
            "Calling Gemini model {} with {} turn(s)",
            self.config.model,
            contents.len()
        );

        let resp = self
            .client
            .post(&url)
            .json(&ApiRequest { contents })
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        let body_text = resp.text().await.map_err(request_error)?;

        debug!(
            "Gemini response status: {}, body length: {}",
            status,
            body_text.len()
        );

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&body_text) {
                return Err(GemBridgeError::Upstream(format!(
                    "Gemini API error ({}): {}",
                    status, err.error.message
                )));
            }
            let snippet: String = body_text.chars().take(200).collect();
            return Err(GemBridgeError::Upstream(format!(
                "Gemini API error ({}): {}",
                status, snippet
            )));
        }

        let api_resp: ApiResponse = serde_json::from_str(&body_text).map_err(|e| {
            GemBridgeError::Upstream(format!("Failed to parse Gemini response: {}", e))
        })?;

        let reply: String = api_resp
            .candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts.unwrap_or_default())
            .filter_map(|p| p.text)
            .collect();

        if reply.is_empty() {
            return Err(GemBridgeError::Upstream(
                "Empty response from Gemini".to_string(),
            ));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new(ProviderConfig {
            model: "gemini-2.5-flash".to_string(),
            api_key: Some("test-key".to_string()),
            api_base: Some(server.uri()),
            request_timeout_secs: 5,
        })
    }

    fn text_response(text: &str) -> serde_json::Value {
        json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": text}]}}
            ]
        })
    }

    #[tokio::test]
    async fn test_generate_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("hello there")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let reply = provider.generate(&[], &Turn::user("hi")).await.unwrap();
        assert_eq!(reply, "hello there");
    }

    #[tokio::test]
    async fn test_request_carries_context_and_inline_image() {
        let server = MockServer::start().await;
        let expected_body = json!({
            "contents": [
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [{"text": "hello!"}]},
                {"role": "user", "parts": [
                    {"inlineData": {"mimeType": "image/png", "data": "Zm9v"}},
                    {"text": "what is in this picture?"}
                ]}
            ]
        });
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(body_json(&expected_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("a fox")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let context = vec![Turn::user("hi"), Turn::assistant("hello!")];
        let turn = Turn::user_with_image("image/png", "Zm9v", "what is in this picture?");
        let reply = provider.generate(&context, &turn).await.unwrap();
        assert_eq!(reply, "a fox");
    }

    #[tokio::test]
    async fn test_api_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.generate(&[], &Turn::user("hi")).await.unwrap_err();
        match err {
            GemBridgeError::Upstream(msg) => {
                assert!(msg.contains("API key not valid"));
                assert!(msg.contains("400"));
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body_is_truncated() {
        let server = MockServer::start().await;
        // Byte 200 lands inside a multi-byte character.
        let body = format!("{}ééééé", "a".repeat(199));
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string(body))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.generate(&[], &Turn::user("hi")).await.unwrap_err();
        match err {
            GemBridgeError::Upstream(msg) => {
                assert!(msg.contains("502"));
                assert!(msg.ends_with('é'));
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_candidates_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.generate(&[], &Turn::user("hi")).await.unwrap_err();
        assert!(matches!(err, GemBridgeError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_slow_upstream_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(text_response("too late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(ProviderConfig {
            model: "gemini-2.5-flash".to_string(),
            api_key: Some("test-key".to_string()),
            api_base: Some(server.uri()),
            request_timeout_secs: 1,
        });

        let err = provider.generate(&[], &Turn::user("hi")).await.unwrap_err();
        assert!(matches!(err, GemBridgeError::UpstreamTimeout));
    }
}
