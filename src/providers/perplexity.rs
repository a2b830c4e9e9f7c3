//! Perplexity client: chat completions with web citations.
//!
//! Text only. The router places this client first in the evidence chain
//! because its answers carry source citations.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    http_client, truncate_body, Completion, CompletionRequest, ProviderError, ProviderKind,
    TextProvider,
};

const API_URL: &str = "https://api.perplexity.ai/chat/completions";
const MODEL: &str = "sonar-pro";

/// Evidence searches stay on clinical and academic sources.
const SEARCH_DOMAINS: [&str; 6] = [
    "pubmed.ncbi.nlm.nih.gov",
    "www.ncbi.nlm.nih.gov",
    "nih.gov",
    "apa.org",
    "scholar.google.com",
    "cochranelibrary.com",
];

pub struct PerplexityProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl PerplexityProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            model: MODEL.to_string(),
        }
    }

    fn request_body(&self, req: &CompletionRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": req.system },
                { "role": "user", "content": req.prompt },
            ],
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "search_domain_filter": SEARCH_DOMAINS,
        })
    }
}

#[async_trait]
impl TextProvider for PerplexityProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Perplexity
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::NotInitialized {
            provider: ProviderKind::Perplexity,
        })?;

        let body = self.request_body(req);

        debug!(model = %self.model, "perplexity chat request");
        let resp = self
            .client
            .post(API_URL)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::Perplexity, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderKind::Perplexity, e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "perplexity request failed");
            return Err(ProviderError::Api {
                provider: ProviderKind::Perplexity,
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse {
                provider: ProviderKind::Perplexity,
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
                provider: ProviderKind::Perplexity,
            });
        }

        let mut completion = Completion::new(content, self.model.clone());
        completion.citations = parsed.citations;
        Ok(completion)
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::VisionRequest;

    #[test]
    fn response_parses_with_citations() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "evidence"}}],
            "citations": ["https://example.org/study"]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.citations.len(), 1);
        assert_eq!(parsed.choices[0].message.content, "evidence");
    }

    #[test]
    fn response_parses_without_citations() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "x"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.citations.is_empty());
    }

    #[test]
    fn request_body_restricts_search_to_clinical_domains() {
        let provider = PerplexityProvider::new(Some("pplx-test".into()));
        let body = provider.request_body(&CompletionRequest::new("sys", "find evidence"));
        let domains = body["search_domain_filter"].as_array().unwrap();
        assert_eq!(domains.len(), SEARCH_DOMAINS.len());
        assert!(domains
            .iter()
            .any(|d| d == "pubmed.ncbi.nlm.nih.gov"));
        assert!(domains.iter().any(|d| d == "apa.org"));
    }

    #[tokio::test]
    async fn vision_is_unsupported() {
        let provider = PerplexityProvider::new(Some("pplx-test".into()));
        let req = VisionRequest {
            prompt: "transcribe".into(),
            image_base64: String::new(),
            media_type: "image/png".into(),
            max_tokens: 512,
        };
        let err = provider.complete_vision(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported { .. }));
    }
}
