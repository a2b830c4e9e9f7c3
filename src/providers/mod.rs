//! Provider clients, one module per hosted text-generation provider.
//!
//! Each client speaks the provider's HTTP API directly over reqwest; no vendor
//! SDKs. A client built without an API key stays constructible but returns
//! `ProviderError::NotInitialized` on every call, so the router can degrade
//! instead of the service failing at startup.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod perplexity;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use perplexity::PerplexityProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four providers this service can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Perplexity,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Perplexity => "perplexity",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} is not initialized (API key absent at startup)")]
    NotInitialized { provider: ProviderKind },

    #[error("HTTP error calling {provider}: {message}")]
    Http {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} returned error (status {status}): {body}")]
    Api {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an empty completion")]
    EmptyResponse { provider: ProviderKind },

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderKind,
        operation: &'static str,
    },

    #[error("audio file too large: {size_mb:.1}MB exceeds the 25MB transcription limit")]
    AudioTooLarge { size_mb: f64 },

    #[error("malformed {provider} response: {source}")]
    MalformedResponse {
        provider: ProviderKind,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized { .. })
    }

    /// Map a reqwest failure, keeping connect/timeout distinctions visible.
    pub fn from_reqwest(provider: ProviderKind, err: reqwest::Error) -> Self {
        let message = if err.is_connect() {
            format!("connection failed: {err}")
        } else if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        Self::Http { provider, message }
    }
}

/// Raw completion from a provider, before the router annotates it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub citations: Vec<String>,
}

impl Completion {
    pub fn new(content: String, model: impl Into<String>) -> Self {
        Self {
            content,
            model: model.into(),
            citations: Vec::new(),
        }
    }
}

/// A plain text-generation request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 2048,
            temperature: 0.3,
        }
    }
}

/// An image-understanding request (OCR transcription of a document photo).
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    pub image_base64: String,
    /// e.g. "image/png"
    pub media_type: String,
    pub max_tokens: u32,
}

/// Uniform seam over text-generation providers. The router only sees this.
#[async_trait]
pub trait TextProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// The model label reported in `AiResponse.model`.
    fn model(&self) -> &str;

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError>;

    async fn complete_vision(&self, _req: &VisionRequest) -> Result<Completion, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.kind(),
            operation: "vision",
        })
    }
}

/// Seam for audio transcription (only OpenAI implements it today).
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ProviderError>;
}

/// API error bodies can be large HTML pages; keep logs and errors bounded.
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 500;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let mut end = LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

/// Shared reqwest client builder: one connection pool per provider client.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_display() {
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
        assert_eq!(ProviderKind::Anthropic.to_string(), "anthropic");
        assert_eq!(ProviderKind::Gemini.to_string(), "gemini");
        assert_eq!(ProviderKind::Perplexity.to_string(), "perplexity");
    }

    #[test]
    fn not_initialized_is_detectable() {
        let err = ProviderError::NotInitialized {
            provider: ProviderKind::Gemini,
        };
        assert!(err.is_not_initialized());

        let err = ProviderError::EmptyResponse {
            provider: ProviderKind::Gemini,
        };
        assert!(!err.is_not_initialized());
    }

    #[test]
    fn completion_request_defaults() {
        let req = CompletionRequest::new("sys", "prompt");
        assert_eq!(req.max_tokens, 2048);
        assert!(req.temperature > 0.0 && req.temperature < 1.0);
    }
}
