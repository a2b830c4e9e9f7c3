//! Model router: one call surface over four independently-failing providers.
//!
//! Every task runs through `try_in_order`: providers are attempted in a fixed
//! chain, each fallback step carrying a lower hinted confidence (trust signal,
//! not measured accuracy). A chain where every provider is missing its API key
//! resolves to a zero-confidence placeholder instead of an error, so the
//! pipeline keeps producing transcripts even with no AI configured.
//!
//! Chains:
//! - analysis / vision: OpenAI → Anthropic → Gemini
//! - detailed insight:  Anthropic → Gemini → OpenAI
//! - evidence search:   Perplexity → OpenAI → Anthropic

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::providers::{
    CompletionRequest, ProviderError, ProviderKind, TextProvider, VisionRequest,
};

/// Hinted confidence by fallback depth. Index 0 is the chain's primary.
const CONFIDENCE_LADDER: [f32; 4] = [0.9, 0.85, 0.7, 0.6];

const CLINICAL_SYSTEM: &str = "You are a clinical documentation assistant for a \
therapy practice. Analyze session content with professional clinical language. \
Be factual and concise; never invent details absent from the source text.";

const INSIGHT_SYSTEM: &str = "You are a clinical supervisor reviewing therapy \
session material. Surface patterns, themes, and risk indicators a treating \
therapist should notice. Ground every observation in the provided text.";

const EVIDENCE_SYSTEM: &str = "You are a clinical research assistant. Recommend \
evidence-based interventions relevant to the presented material, citing \
sources where available.";

const SYNTHESIS_SYSTEM: &str = "You are a senior clinician consolidating \
analyses from multiple reviewers. Synthesize the labeled analyses below into \
one coherent assessment, resolve contradictions, and do not add new claims.";

/// Annotated provider output as callers (and the HTTP layer) see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    pub content: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
}

impl AiResponse {
    fn placeholder(kind: ProviderKind) -> Self {
        Self {
            content: "AI analysis unavailable: no provider is configured with an API key."
                .to_string(),
            model: format!("{kind}-not-initialized"),
            confidence: Some(0.0),
            citations: Vec::new(),
        }
    }

    fn is_placeholder(&self) -> bool {
        self.confidence == Some(0.0)
    }
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("every provider in the {task} chain failed; last error: {source}")]
    ChainExhausted {
        task: &'static str,
        #[source]
        source: ProviderError,
    },
}

pub struct ModelRouter {
    openai: Arc<dyn TextProvider>,
    anthropic: Arc<dyn TextProvider>,
    gemini: Arc<dyn TextProvider>,
    perplexity: Arc<dyn TextProvider>,
}

impl ModelRouter {
    pub fn new(
        openai: Arc<dyn TextProvider>,
        anthropic: Arc<dyn TextProvider>,
        gemini: Arc<dyn TextProvider>,
        perplexity: Arc<dyn TextProvider>,
    ) -> Self {
        Self {
            openai,
            anthropic,
            gemini,
            perplexity,
        }
    }

    fn analysis_chain(&self) -> [&dyn TextProvider; 3] {
        [&*self.openai, &*self.anthropic, &*self.gemini]
    }

    fn insight_chain(&self) -> [&dyn TextProvider; 3] {
        [&*self.anthropic, &*self.gemini, &*self.openai]
    }

    fn evidence_chain(&self) -> [&dyn TextProvider; 3] {
        [&*self.perplexity, &*self.openai, &*self.anthropic]
    }

    /// Attempt providers in order; the first success wins, annotated with the
    /// confidence for its fallback depth. A chain where every failure is
    /// "not initialized" degrades to a placeholder rather than an error.
    async fn try_in_order(
        &self,
        task: &'static str,
        chain: &[&dyn TextProvider],
        req: &CompletionRequest,
    ) -> Result<AiResponse, RouterError> {
        let mut all_uninitialized = true;
        let mut last_err = None;

        for (depth, provider) in chain.iter().enumerate() {
            match provider.complete(req).await {
                Ok(completion) => {
                    if depth > 0 {
                        info!(task, provider = %provider.kind(), depth, "fallback provider answered");
                    }
                    let confidence =
                        CONFIDENCE_LADDER[depth.min(CONFIDENCE_LADDER.len() - 1)];
                    return Ok(AiResponse {
                        content: completion.content,
                        model: completion.model,
                        confidence: Some(confidence),
                        citations: completion.citations,
                    });
                }
                Err(err) => {
                    if !err.is_not_initialized() {
                        all_uninitialized = false;
                        warn!(task, provider = %provider.kind(), error = %err, "provider call failed");
                    }
                    last_err = Some(err);
                }
            }
        }

        if all_uninitialized {
            let kind = chain
                .first()
                .map(|p| p.kind())
                .unwrap_or(ProviderKind::OpenAi);
            return Ok(AiResponse::placeholder(kind));
        }
        Err(RouterError::ChainExhausted {
            task,
            source: last_err.unwrap_or(ProviderError::EmptyResponse {
                provider: ProviderKind::OpenAi,
            }),
        })
    }

    async fn vision_in_order(
        &self,
        chain: &[&dyn TextProvider],
        req: &VisionRequest,
    ) -> Result<AiResponse, RouterError> {
        let mut all_uninitialized = true;
        let mut last_err = None;

        for (depth, provider) in chain.iter().enumerate() {
            match provider.complete_vision(req).await {
                Ok(completion) => {
                    let confidence =
                        CONFIDENCE_LADDER[depth.min(CONFIDENCE_LADDER.len() - 1)];
                    return Ok(AiResponse {
                        content: completion.content,
                        model: completion.model,
                        confidence: Some(confidence),
                        citations: completion.citations,
                    });
                }
                Err(err) => {
                    if !err.is_not_initialized() {
                        all_uninitialized = false;
                        warn!(provider = %provider.kind(), error = %err, "vision provider failed");
                    }
                    last_err = Some(err);
                }
            }
        }

        if all_uninitialized {
            return Ok(AiResponse::placeholder(ProviderKind::OpenAi));
        }
        Err(RouterError::ChainExhausted {
            task: "vision",
            source: last_err.unwrap_or(ProviderError::EmptyResponse {
                provider: ProviderKind::OpenAi,
            }),
        })
    }

    // ── Task surface ────────────────────────────────────────────────────────

    pub async fn clinical_analysis(
        &self,
        content: &str,
        context: Option<&str>,
    ) -> Result<AiResponse, RouterError> {
        let req = task_request(CLINICAL_SYSTEM, content, context);
        self.try_in_order("clinical-analysis", &self.analysis_chain(), &req)
            .await
    }

    pub async fn detailed_insights(
        &self,
        content: &str,
        context: Option<&str>,
    ) -> Result<AiResponse, RouterError> {
        let req = task_request(INSIGHT_SYSTEM, content, context);
        self.try_in_order("detailed-insights", &self.insight_chain(), &req)
            .await
    }

    pub async fn evidence_recommendations(
        &self,
        content: &str,
        context: Option<&str>,
    ) -> Result<AiResponse, RouterError> {
        let req = task_request(EVIDENCE_SYSTEM, content, context);
        self.try_in_order("evidence-search", &self.evidence_chain(), &req)
            .await
    }

    /// OCR transcription of a document photograph.
    pub async fn multimodal_ocr(&self, req: &VisionRequest) -> Result<AiResponse, RouterError> {
        self.vision_in_order(&self.analysis_chain(), req).await
    }

    /// Free-form completion with a caller-supplied system prompt, through the
    /// analysis chain. Used for metadata extraction and note generation.
    pub async fn completion(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<AiResponse, RouterError> {
        let req = CompletionRequest::new(system, prompt);
        self.try_in_order("completion", &self.analysis_chain(), &req)
            .await
    }

    /// Fan the content out to three providers concurrently, keep whichever
    /// succeed, and synthesize the survivors into one answer. Zero survivors
    /// degrades to a single clinical-analysis call, never an error.
    pub async fn ensemble_analysis(
        &self,
        content: &str,
        context: Option<&str>,
    ) -> Result<AiResponse, RouterError> {
        let clinical = task_request(CLINICAL_SYSTEM, content, context);
        let insight = task_request(INSIGHT_SYSTEM, content, context);
        let evidence = task_request(EVIDENCE_SYSTEM, content, context);

        // The chains must outlive the joined futures, so bind them first.
        let analysis_chain = self.analysis_chain();
        let insight_chain = self.insight_chain();
        let evidence_chain = self.evidence_chain();
        let (a, b, c) = tokio::join!(
            self.try_in_order("ensemble-clinical", &analysis_chain, &clinical),
            self.try_in_order("ensemble-insight", &insight_chain, &insight),
            self.try_in_order("ensemble-evidence", &evidence_chain, &evidence),
        );

        let contributors: Vec<AiResponse> = [a, b, c]
            .into_iter()
            .filter_map(Result::ok)
            .filter(|r| !r.is_placeholder())
            .collect();

        if contributors.is_empty() {
            info!("ensemble produced no contributors, degrading to single clinical analysis");
            return self.clinical_analysis(content, context).await;
        }

        let confidence = contributors
            .iter()
            .filter_map(|r| r.confidence)
            .fold(0.0_f32, f32::max);
        let citations: Vec<String> = contributors
            .iter()
            .flat_map(|r| r.citations.iter().cloned())
            .collect();
        let combined = contributors
            .iter()
            .map(|r| format!("**{} Analysis:**\n{}", r.model, r.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        // Synthesis gets one fallback step; past that, the labeled
        // concatenation is the answer.
        let synth_req = CompletionRequest::new(SYNTHESIS_SYSTEM, combined.as_str());
        let synth_chain: [&dyn TextProvider; 2] = [&*self.openai, &*self.anthropic];
        let mut content_out = combined;
        let mut model_out = "multi-model-ensemble".to_string();
        for provider in synth_chain {
            match provider.complete(&synth_req).await {
                Ok(completion) => {
                    content_out = completion.content;
                    model_out = format!("ensemble-{}", completion.model);
                    break;
                }
                Err(err) if err.is_not_initialized() => continue,
                Err(err) => {
                    warn!(provider = %provider.kind(), error = %err, "synthesis call failed");
                }
            }
        }

        Ok(AiResponse {
            content: content_out,
            model: model_out,
            confidence: Some(confidence),
            citations,
        })
    }
}

fn task_request(system: &str, content: &str, context: Option<&str>) -> CompletionRequest {
    let prompt = match context {
        Some(ctx) if !ctx.trim().is_empty() => format!("Context: {ctx}\n\n{content}"),
        _ => content.to_string(),
    };
    CompletionRequest::new(system, prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Completion;
    use async_trait::async_trait;

    enum Script {
        Answer(&'static str),
        Fail,
        NotInit,
    }

    struct ScriptedProvider {
        kind: ProviderKind,
        script: Script,
    }

    impl ScriptedProvider {
        fn answering(kind: ProviderKind, text: &'static str) -> Arc<dyn TextProvider> {
            Arc::new(Self {
                kind,
                script: Script::Answer(text),
            })
        }

        fn failing(kind: ProviderKind) -> Arc<dyn TextProvider> {
            Arc::new(Self {
                kind,
                script: Script::Fail,
            })
        }

        fn uninitialized(kind: ProviderKind) -> Arc<dyn TextProvider> {
            Arc::new(Self {
                kind,
                script: Script::NotInit,
            })
        }
    }

    #[async_trait]
    impl TextProvider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, _req: &CompletionRequest) -> Result<Completion, ProviderError> {
            match &self.script {
                Script::Answer(text) => {
                    Ok(Completion::new(text.to_string(), format!("{}-model", self.kind)))
                }
                Script::Fail => Err(ProviderError::Api {
                    provider: self.kind,
                    status: 500,
                    body: "boom".into(),
                }),
                Script::NotInit => Err(ProviderError::NotInitialized {
                    provider: self.kind,
                }),
            }
        }
    }

    fn router(
        openai: Arc<dyn TextProvider>,
        anthropic: Arc<dyn TextProvider>,
        gemini: Arc<dyn TextProvider>,
        perplexity: Arc<dyn TextProvider>,
    ) -> ModelRouter {
        ModelRouter::new(openai, anthropic, gemini, perplexity)
    }

    #[tokio::test]
    async fn primary_provider_gets_top_confidence() {
        let r = router(
            ScriptedProvider::answering(ProviderKind::OpenAi, "analysis"),
            ScriptedProvider::failing(ProviderKind::Anthropic),
            ScriptedProvider::failing(ProviderKind::Gemini),
            ScriptedProvider::failing(ProviderKind::Perplexity),
        );
        let out = r.clinical_analysis("session text", None).await.unwrap();
        assert_eq!(out.content, "analysis");
        assert_eq!(out.confidence, Some(0.9));
    }

    #[tokio::test]
    async fn fallback_depth_lowers_confidence() {
        let r = router(
            ScriptedProvider::failing(ProviderKind::OpenAi),
            ScriptedProvider::failing(ProviderKind::Anthropic),
            ScriptedProvider::answering(ProviderKind::Gemini, "third try"),
            ScriptedProvider::failing(ProviderKind::Perplexity),
        );
        let out = r.clinical_analysis("session text", None).await.unwrap();
        assert_eq!(out.content, "third try");
        assert_eq!(out.confidence, Some(0.7));
    }

    #[tokio::test]
    async fn all_uninitialized_yields_zero_confidence_placeholder() {
        let r = router(
            ScriptedProvider::uninitialized(ProviderKind::OpenAi),
            ScriptedProvider::uninitialized(ProviderKind::Anthropic),
            ScriptedProvider::uninitialized(ProviderKind::Gemini),
            ScriptedProvider::uninitialized(ProviderKind::Perplexity),
        );
        let out = r.clinical_analysis("session text", None).await.unwrap();
        assert_eq!(out.model, "openai-not-initialized");
        assert_eq!(out.confidence, Some(0.0));
    }

    #[tokio::test]
    async fn all_real_failures_surface_an_error() {
        let r = router(
            ScriptedProvider::failing(ProviderKind::OpenAi),
            ScriptedProvider::failing(ProviderKind::Anthropic),
            ScriptedProvider::failing(ProviderKind::Gemini),
            ScriptedProvider::failing(ProviderKind::Perplexity),
        );
        let err = r.clinical_analysis("session text", None).await.unwrap_err();
        assert!(matches!(err, RouterError::ChainExhausted { .. }));
    }

    #[tokio::test]
    async fn ensemble_confidence_is_max_of_contributors() {
        // Clinical branch succeeds at depth 0 (0.9); insight branch succeeds
        // at depth 1 (0.85 via gemini); evidence branch fails entirely.
        let r = router(
            ScriptedProvider::answering(ProviderKind::OpenAi, "clinical"),
            ScriptedProvider::failing(ProviderKind::Anthropic),
            ScriptedProvider::answering(ProviderKind::Gemini, "insight"),
            ScriptedProvider::failing(ProviderKind::Perplexity),
        );
        let out = r.ensemble_analysis("session text", None).await.unwrap();
        assert_eq!(out.confidence, Some(0.9));
        assert!(out.model.starts_with("ensemble-"));
    }

    #[tokio::test]
    async fn ensemble_polls_all_three_chains_concurrently() {
        let r = router(
            ScriptedProvider::answering(ProviderKind::OpenAi, "clinical view"),
            ScriptedProvider::answering(ProviderKind::Anthropic, "insight view"),
            ScriptedProvider::answering(ProviderKind::Gemini, "unused"),
            ScriptedProvider::answering(ProviderKind::Perplexity, "evidence view"),
        );
        let out = r.ensemble_analysis("session text", None).await.unwrap();
        assert_eq!(out.confidence, Some(0.9));
        assert!(out.model.starts_with("ensemble-"));
    }

    #[tokio::test]
    async fn ensemble_with_no_survivors_degrades_to_placeholder_not_error() {
        let r = router(
            ScriptedProvider::uninitialized(ProviderKind::OpenAi),
            ScriptedProvider::uninitialized(ProviderKind::Anthropic),
            ScriptedProvider::uninitialized(ProviderKind::Gemini),
            ScriptedProvider::uninitialized(ProviderKind::Perplexity),
        );
        let out = r.ensemble_analysis("session text", None).await.unwrap();
        assert_eq!(out.confidence, Some(0.0));
        assert!(out.model.ends_with("-not-initialized"));
    }

    #[tokio::test]
    async fn ensemble_keeps_raw_concatenation_when_synthesis_fails() {
        // Only gemini answers, so both synthesizers (openai, anthropic) fail.
        let r = router(
            ScriptedProvider::failing(ProviderKind::OpenAi),
            ScriptedProvider::failing(ProviderKind::Anthropic),
            ScriptedProvider::answering(ProviderKind::Gemini, "only voice"),
            ScriptedProvider::failing(ProviderKind::Perplexity),
        );
        let out = r.ensemble_analysis("session text", None).await.unwrap();
        assert_eq!(out.model, "multi-model-ensemble");
        assert!(out.content.contains("only voice"));
        assert!(out.content.contains("Analysis:"));
    }

    #[tokio::test]
    async fn evidence_chain_leads_with_perplexity() {
        let r = router(
            ScriptedProvider::answering(ProviderKind::OpenAi, "openai answer"),
            ScriptedProvider::answering(ProviderKind::Anthropic, "anthropic answer"),
            ScriptedProvider::answering(ProviderKind::Gemini, "gemini answer"),
            ScriptedProvider::answering(ProviderKind::Perplexity, "cited evidence"),
        );
        let out = r.evidence_recommendations("query", None).await.unwrap();
        assert_eq!(out.content, "cited evidence");
        assert_eq!(out.model, "perplexity-model");
    }
}
