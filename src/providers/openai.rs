//! OpenAI client: chat completions, vision, and Whisper transcription.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{
    http_client, truncate_body, Completion, CompletionRequest, ProviderError, ProviderKind,
    SpeechToText, TextProvider, VisionRequest,
};
use crate::config::MAX_AUDIO_SIZE;

const API_BASE: &str = "https://api.openai.com/v1";
const CHAT_MODEL: &str = "gpt-4o";
const TRANSCRIBE_MODEL: &str = "whisper-1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            model: CHAT_MODEL.to_string(),
        }
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::NotInitialized {
            provider: ProviderKind::OpenAi,
        })
    }

    async fn chat(&self, messages: serde_json::Value, max_tokens: u32, temperature: f32)
        -> Result<Completion, ProviderError>
    {
        let key = self.key()?;
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        debug!(model = %self.model, "openai chat request");
        let resp = self
            .client
            .post(format!("{API_BASE}/chat/completions"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::OpenAi, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::OpenAi, e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "openai chat request failed");
            return Err(ProviderError::Api {
                provider: ProviderKind::OpenAi,
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse {
                provider: ProviderKind::OpenAi,
                source: e,
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: ProviderKind::OpenAi,
            });
        }
        Ok(Completion::new(content, parsed.model.unwrap_or_else(|| self.model.clone())))
    }
}

#[async_trait]
impl TextProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError> {
        let messages = json!([
            { "role": "system", "content": req.system },
            { "role": "user", "content": req.prompt },
        ]);
        self.chat(messages, req.max_tokens, req.temperature).await
    }

    async fn complete_vision(&self, req: &VisionRequest) -> Result<Completion, ProviderError> {
        let data_url = format!("data:{};base64,{}", req.media_type, req.image_base64);
        let messages = json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": req.prompt },
                { "type": "image_url", "image_url": { "url": data_url } },
            ],
        }]);
        self.chat(messages, req.max_tokens, 0.0).await
    }
}

#[async_trait]
impl SpeechToText for OpenAiProvider {
    async fn transcribe(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ProviderError> {
        let key = self.key()?;
        if bytes.len() as u64 > MAX_AUDIO_SIZE {
            return Err(ProviderError::AudioTooLarge {
                size_mb: bytes.len() as f64 / (1024.0 * 1024.0),
            });
        }

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ProviderError::Http {
                provider: ProviderKind::OpenAi,
                message: e.to_string(),
            })?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", TRANSCRIBE_MODEL)
            .text("response_format", "json");

        debug!(file = %file_name, "openai transcription request");
        let resp = self
            .client
            .post(format!("{API_BASE}/audio/transcriptions"))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::OpenAi, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::OpenAi, e))?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: ProviderKind::OpenAi,
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let parsed: TranscriptionResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse {
                provider: ProviderKind::OpenAi,
                source: e,
            })?;
        if parsed.text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: ProviderKind::OpenAi,
            });
        }
        Ok(parsed.text)
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}
