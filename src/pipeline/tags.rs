//! Document tags and summaries: AI-derived when a provider answers, keyword
//! heuristics otherwise.

use serde::Deserialize;
use tracing::debug;

use crate::pipeline::ingest::sanitize::clip;
use crate::router::ModelRouter;

/// Modality and presenting-concern keywords. First match per row wins; tag
/// casing is what the practice UI displays.
const TAG_KEYWORDS: &[(&str, &[&str])] = &[
    ("CBT", &["cognitive behavioral", "cognitive-behavioral", "cbt", "thought record", "cognitive restructuring"]),
    ("DBT", &["dialectical", "dbt", "distress tolerance", "emotion regulation skills"]),
    ("ACT", &["acceptance and commitment", "values work", "cognitive defusion"]),
    ("EMDR", &["emdr", "eye movement desensitization", "bilateral stimulation"]),
    ("Anxiety", &["anxiety", "anxious", "panic", "excessive worry"]),
    ("Depression", &["depression", "depressed", "low mood", "anhedonia"]),
    ("Trauma", &["trauma", "ptsd", "flashback", "hypervigilance"]),
    ("Grief", &["grief", "bereavement", "mourning"]),
    ("Relationships", &["relationship conflict", "couples", "marital", "family conflict"]),
    ("Substance Use", &["substance use", "alcohol", "addiction", "sobriety", "relapse"]),
    ("Mindfulness", &["mindfulness", "meditation", "grounding exercise"]),
    ("Sleep", &["insomnia", "sleep hygiene", "nightmares"]),
];

const MAX_TAGS: usize = 10;

const ENRICH_SYSTEM: &str = "You label clinical documents for a therapy \
practice. Reply with only a JSON object {\"summary\": string, \"tags\": \
[string]}: a one-to-two sentence factual summary and short clinical topic \
tags (modalities, presenting concerns), at most ten.";

/// How much document text the enrichment prompt carries.
const ENRICH_BUDGET: usize = 4000;

#[derive(Deserialize)]
struct EnrichmentReply {
    summary: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Tags plus summary for a stored document. Routes through the AI chain
/// first; an unconfigured or failing router degrades to the keyword path.
pub async fn enrich(router: &ModelRouter, text: &str) -> (Vec<String>, String) {
    match router.completion(ENRICH_SYSTEM, clip(text, ENRICH_BUDGET)).await {
        Ok(resp) if resp.confidence != Some(0.0) => {
            if let Some(enriched) = parse_enrichment(&resp.content) {
                return enriched;
            }
            debug!(model = %resp.model, "unparseable enrichment reply, using keyword fallback");
        }
        Ok(_) => {}
        Err(err) => {
            debug!(error = %err, "enrichment call failed, using keyword fallback");
        }
    }
    (derive_tags(text), fallback_summary(text))
}

/// Lenient parse: models wrap JSON in prose or code fences, so slice from the
/// first brace to the last.
fn parse_enrichment(reply: &str) -> Option<(Vec<String>, String)> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    let parsed: EnrichmentReply = serde_json::from_str(&reply[start..=end]).ok()?;
    let summary = parsed
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;
    let mut tags: Vec<String> = parsed
        .tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.truncate(MAX_TAGS);
    Some((tags, summary))
}

/// Derive display tags from extracted text: modality/concern keywords plus an
/// age-group marker, capped at ten.
pub fn derive_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tags: Vec<String> = TAG_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(tag, _)| tag.to_string())
        .collect();

    if lower.contains("adolescent") || lower.contains("teen") || lower.contains("school refusal")
    {
        tags.push("Adolescent".to_string());
    } else if lower.contains("adult") {
        tags.push("Adult".to_string());
    }

    tags.truncate(MAX_TAGS);
    tags
}

/// Extractive summary used when no AI provider produced one: the first
/// substantial sentence that mentions the session, clipped to 200 characters.
pub fn fallback_summary(text: &str) -> String {
    const MARKERS: [&str; 5] = ["client", "session", "discussed", "reported", "presented"];
    const LIMIT: usize = 200;

    for sentence in text.split(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.len() > 50 {
            let lower = sentence.to_lowercase();
            if MARKERS.iter().any(|m| lower.contains(m)) {
                return clip_chars(sentence, LIMIT);
            }
        }
    }
    clip_chars(text.trim(), LIMIT)
}

fn clip_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::providers::{
        Completion, CompletionRequest, ProviderError, ProviderKind, TextProvider,
    };

    struct FixedProvider {
        kind: ProviderKind,
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl TextProvider for FixedProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }
        fn model(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _req: &CompletionRequest) -> Result<Completion, ProviderError> {
            match self.reply {
                Some(text) => Ok(Completion::new(text.to_string(), "fixed-model")),
                None => Err(ProviderError::NotInitialized {
                    provider: self.kind,
                }),
            }
        }
    }

    fn router_replying(reply: Option<&'static str>) -> ModelRouter {
        let provider = |kind| {
            Arc::new(FixedProvider { kind, reply }) as Arc<dyn TextProvider>
        };
        ModelRouter::new(
            provider(ProviderKind::OpenAi),
            provider(ProviderKind::Anthropic),
            provider(ProviderKind::Gemini),
            provider(ProviderKind::Perplexity),
        )
    }

    #[tokio::test]
    async fn enrich_prefers_the_model_reply() {
        let router = router_replying(Some(
            r#"Here you go: {"summary": "Client worked on exposure hierarchy.", "tags": ["Anxiety", "Exposure Therapy"]}"#,
        ));
        let (tags, summary) = enrich(&router, "irrelevant source text").await;
        assert_eq!(summary, "Client worked on exposure hierarchy.");
        assert_eq!(tags, vec!["Anxiety", "Exposure Therapy"]);
    }

    #[tokio::test]
    async fn enrich_without_providers_uses_keyword_path() {
        let router = router_replying(None);
        let text = "Client reported less anxiety after CBT thought record practice this week.";
        let (tags, summary) = enrich(&router, text).await;
        assert!(tags.contains(&"CBT".to_string()));
        assert!(summary.starts_with("Client reported"));
    }

    #[tokio::test]
    async fn enrich_with_unparseable_reply_uses_keyword_path() {
        let router = router_replying(Some("I cannot produce JSON for this."));
        let text = "Client discussed grief after a recent bereavement in the family.";
        let (tags, summary) = enrich(&router, text).await;
        assert!(tags.contains(&"Grief".to_string()));
        assert!(!summary.is_empty());
    }

    #[test]
    fn enrichment_parse_caps_tags_and_requires_summary() {
        let many: Vec<String> = (0..15).map(|i| format!("\"t{i}\"")).collect();
        let raw = format!(
            "{{\"summary\": \"ok\", \"tags\": [{}]}}",
            many.join(",")
        );
        let (tags, _) = parse_enrichment(&raw).unwrap();
        assert_eq!(tags.len(), MAX_TAGS);

        assert!(parse_enrichment("{\"tags\": [\"a\"]}").is_none());
    }

    #[test]
    fn modality_keywords_become_tags() {
        let text = "Applied CBT thought record work; client reports less anxiety this week.";
        let tags = derive_tags(text);
        assert!(tags.contains(&"CBT".to_string()));
        assert!(tags.contains(&"Anxiety".to_string()));
    }

    #[test]
    fn adolescent_marker_beats_adult() {
        let tags = derive_tags("Adolescent client, adult sibling present.");
        assert!(tags.contains(&"Adolescent".to_string()));
        assert!(!tags.contains(&"Adult".to_string()));
    }

    #[test]
    fn tags_are_capped_at_ten() {
        let text = "cbt dialectical acceptance and commitment emdr anxiety depressed \
                    trauma grief marital alcohol mindfulness insomnia adolescent";
        assert_eq!(derive_tags(text).len(), 10);
    }

    #[test]
    fn no_keywords_means_no_tags() {
        assert!(derive_tags("Invoice for October services.").is_empty());
    }

    #[test]
    fn summary_picks_first_substantial_session_sentence() {
        let text = "Ok. Client presented with flat affect and discussed ongoing conflict \
                    with a coworker at length. Next steps follow.";
        let summary = fallback_summary(text);
        assert!(summary.starts_with("Client presented with flat affect"));
        assert!(summary.chars().count() <= 201);
    }

    #[test]
    fn summary_falls_back_to_clipped_text() {
        let text = "Administrative memo about parking validation and building access.";
        assert_eq!(fallback_summary(text), text);
    }
}
