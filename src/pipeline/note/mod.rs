//! Progress-note generation: ensemble call, section parse, assembly with
//! explicit placeholders for anything the model left out.

pub mod parser;
pub mod prompt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pipeline::tags;
use crate::router::{ModelRouter, RouterError};

pub use parser::{parse_sections, ParsedNote};

/// The six-section clinical note persisted to the client record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNote {
    pub title: String,
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
    pub tonal_analysis: String,
    pub key_points: Vec<String>,
    pub significant_quotes: Vec<String>,
    pub narrative_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_date: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Which sections came from a placeholder rather than model output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placeholder_sections: Vec<String>,
}

/// Generate a progress note for an extracted transcript. Section-level gaps
/// never fail the call: the assembled note substitutes fixed placeholder text
/// and records which sections needed it.
pub async fn generate_progress_note(
    router: &ModelRouter,
    transcript: &str,
    client_name: Option<&str>,
    client_id: Option<String>,
    session_date: Option<String>,
) -> Result<ProgressNote, RouterError> {
    let prompt = prompt::progress_note_prompt(transcript, client_name);
    let response = router.ensemble_analysis(&prompt, None).await?;

    let parsed = parse_sections(&response.content);
    if parsed.is_partial() {
        warn!(
            missing = ?parsed.missing_sections,
            model = %response.model,
            "model output missing sections, substituting placeholders"
        );
    }

    Ok(assemble(parsed, transcript, client_id, session_date))
}

/// Fill gaps with placeholders. The narrative placeholder is extractive (from
/// the transcript) so the stored summary is never generic boilerplate.
fn assemble(
    parsed: ParsedNote,
    transcript: &str,
    client_id: Option<String>,
    session_date: Option<String>,
) -> ProgressNote {
    let placeholder_sections = parsed.missing_sections.clone();
    ProgressNote {
        title: parsed
            .title
            .unwrap_or_else(|| "Therapy Session Note".to_string()),
        subjective: parsed
            .subjective
            .unwrap_or_else(|| "No subjective report captured.".to_string()),
        objective: parsed
            .objective
            .unwrap_or_else(|| "No objective observations captured.".to_string()),
        assessment: parsed
            .assessment
            .unwrap_or_else(|| "No assessment recorded.".to_string()),
        plan: parsed
            .plan
            .unwrap_or_else(|| "No plan documented.".to_string()),
        tonal_analysis: parsed
            .tonal_analysis
            .unwrap_or_else(|| "No tonal analysis available.".to_string()),
        key_points: parsed.key_points,
        significant_quotes: parsed.significant_quotes,
        narrative_summary: parsed
            .narrative_summary
            .unwrap_or_else(|| tags::fallback_summary(transcript)),
        client_id,
        session_date,
        created_at: Utc::now(),
        placeholder_sections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_keep_every_section_non_empty() {
        let parsed = ParsedNote {
            missing_sections: parser::SECTION_NAMES.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let note = assemble(
            parsed,
            "Client presented with flat affect and discussed workplace stress today.",
            None,
            None,
        );
        assert!(!note.title.is_empty());
        assert_eq!(note.objective, "No objective observations captured.");
        assert_eq!(note.plan, "No plan documented.");
        assert!(note.narrative_summary.starts_with("Client presented"));
        assert_eq!(note.placeholder_sections.len(), parser::SECTION_NAMES.len());
    }

    #[test]
    fn parsed_sections_pass_through_untouched() {
        let parsed = ParsedNote {
            title: Some("Intake Session".to_string()),
            subjective: Some("Client described recent panic episodes.".to_string()),
            objective: Some("Restless, rapid speech.".to_string()),
            assessment: Some("Panic disorder, moderate.".to_string()),
            plan: Some("Begin interoceptive exposure.".to_string()),
            tonal_analysis: Some("Anxious but motivated.".to_string()),
            key_points: vec!["First panic episode three weeks ago".to_string()],
            significant_quotes: vec!["I thought I was having a heart attack.".to_string()],
            narrative_summary: Some("Productive intake session.".to_string()),
            missing_sections: Vec::new(),
        };
        let note = assemble(parsed, "transcript", Some("client-1".to_string()), Some("2025-08-04".to_string()));
        assert_eq!(note.title, "Intake Session");
        assert_eq!(note.session_date.as_deref(), Some("2025-08-04"));
        assert!(note.placeholder_sections.is_empty());
    }

    #[test]
    fn note_serializes_camel_case() {
        let note = assemble(ParsedNote::default(), "text", None, None);
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("tonalAnalysis").is_some());
        assert!(json.get("keyPoints").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
