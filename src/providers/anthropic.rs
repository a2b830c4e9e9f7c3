//! Anthropic client: messages API, text and vision.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    http_client, truncate_body, Completion, CompletionRequest, ProviderError, ProviderKind,
    TextProvider, VisionRequest,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-sonnet-4-20250514";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            model: MODEL.to_string(),
        }
    }

    async fn messages(&self, body: serde_json::Value) -> Result<Completion, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::NotInitialized {
            provider: ProviderKind::Anthropic,
        })?;

        debug!(model = %self.model, "anthropic messages request");
        let resp = self
            .client
            .post(API_URL)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::Anthropic, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::Anthropic, e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "anthropic request failed");
            return Err(ProviderError::Api {
                provider: ProviderKind::Anthropic,
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse {
                provider: ProviderKind::Anthropic,
                source: e,
            })?;

        let content: String = parsed
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: ProviderKind::Anthropic,
            });
        }
        Ok(Completion::new(content, parsed.model.unwrap_or_else(|| self.model.clone())))
    }
}

#[async_trait]
impl TextProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError> {
        let body = json!({
            "model": self.model,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "system": req.system,
            "messages": [{ "role": "user", "content": req.prompt }],
        });
        self.messages(body).await
    }

    async fn complete_vision(&self, req: &VisionRequest) -> Result<Completion, ProviderError> {
        let body = json!({
            "model": self.model,
            "max_tokens": req.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": req.media_type,
                            "data": req.image_base64,
                        },
                    },
                    { "type": "text", "text": req.prompt },
                ],
            }],
        });
        self.messages(body).await
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct MessagesResponse {
    model: Option<String>,
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_response_joins_text_blocks() {
        let raw = r#"{
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"}
            ]
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let joined: String = parsed
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(joined, "first\nsecond");
    }

    #[tokio::test]
    async fn missing_key_reports_not_initialized() {
        let provider = AnthropicProvider::new(None);
        let err = provider
            .complete(&CompletionRequest::new("sys", "hi"))
            .await
            .unwrap_err();
        assert!(err.is_not_initialized());
    }
}
