//! Google Gemini client: generateContent, text and vision.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    http_client, truncate_body, Completion, CompletionRequest, ProviderError, ProviderKind,
    TextProvider, VisionRequest,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MODEL: &str = "gemini-2.0-flash";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            model: MODEL.to_string(),
        }
    }

    async fn generate(&self, body: serde_json::Value) -> Result<Completion, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::NotInitialized {
            provider: ProviderKind::Gemini,
        })?;

        debug!(model = %self.model, "gemini generateContent request");
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::Gemini, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::Gemini, e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "gemini request failed");
            return Err(ProviderError::Api {
                provider: ProviderKind::Gemini,
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse {
                provider: ProviderKind::Gemini,
                source: e,
            })?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: ProviderKind::Gemini,
            });
        }
        Ok(Completion::new(content, self.model.clone()))
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": req.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": req.prompt }] }],
            "generationConfig": {
                "maxOutputTokens": req.max_tokens,
                "temperature": req.temperature,
            },
        });
        self.generate(body).await
    }

    async fn complete_vision(&self, req: &VisionRequest) -> Result<Completion, ProviderError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": req.prompt },
                    { "inlineData": { "mimeType": req.media_type, "data": req.image_base64 } },
                ],
            }],
            "generationConfig": { "maxOutputTokens": req.max_tokens },
        });
        self.generate(body).await
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_response_parses_parts() {
        let raw = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "extracted"}], "role": "model"}
            }]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.candidates[0].content.parts[0].text.as_deref(),
            Some("extracted")
        );
    }

    #[test]
    fn empty_candidates_tolerated_by_parser() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }

    #[tokio::test]
    async fn missing_key_reports_not_initialized() {
        let provider = GeminiProvider::new(None);
        let err = provider
            .complete(&CompletionRequest::new("sys", "hi"))
            .await
            .unwrap_err();
        assert!(err.is_not_initialized());
    }
}
