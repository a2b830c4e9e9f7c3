//! Best-effort client/session metadata. Advisory only: this module never
//! fails, it degrades from an LLM call to a regex scan to nothing.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::pipeline::dates;
use crate::pipeline::ingest::sanitize::clip;
use crate::router::ModelRouter;

const METADATA_SYSTEM: &str = "You extract document metadata. Reply with only \
a JSON object {\"clientName\": string or null, \"sessionDate\": \"YYYY-MM-DD\" \
or null}. Use null when a field is not stated in the text.";

/// How much of the transcript the metadata prompt sees.
const PROMPT_BUDGET: usize = 2000;

static CLIENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:[Cc]lient(?:\s+[Nn]ame)?|[Pp]atient)\s*[:\-][ \t]*\x22?([A-Z][A-Za-z'\-]+(?:[ \t][A-Z][A-Za-z'\-]+){0,2})",
    )
    .expect("client name pattern")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub client_name: Option<String>,
    pub session_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataReply {
    client_name: Option<String>,
    session_date: Option<String>,
}

/// Ask the router for `{clientName, sessionDate}` JSON; when the reply is
/// unusable (no provider, malformed JSON), fall back to a regex scan.
pub async fn extract_metadata(router: &ModelRouter, text: &str) -> DocumentMetadata {
    let excerpt = clip(text, PROMPT_BUDGET);

    let ai = match router.completion(METADATA_SYSTEM, excerpt).await {
        Ok(resp) if resp.confidence != Some(0.0) => parse_reply(&resp.content),
        Ok(_) => None,
        Err(err) => {
            debug!(error = %err, "metadata extraction call failed, using regex fallback");
            None
        }
    };

    let fallback = regex_scan(text);
    match ai {
        Some(meta) => DocumentMetadata {
            client_name: meta.client_name.or(fallback.client_name),
            session_date: meta.session_date.or(fallback.session_date),
        },
        None => fallback,
    }
}

/// Regex-only scan, used directly in tests and as the degraded path.
pub fn regex_scan(text: &str) -> DocumentMetadata {
    let client_name = CLIENT_NAME
        .captures(text)
        .map(|caps| caps[1].trim().to_string());
    let session_date = dates::extract_date(text).extracted_date;
    DocumentMetadata {
        client_name,
        session_date,
    }
}

/// Lenient parse: accept a JSON object anywhere in the reply, tolerate code
/// fences and prose around it.
fn parse_reply(reply: &str) -> Option<DocumentMetadata> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    let parsed: MetadataReply = serde_json::from_str(&reply[start..=end]).ok()?;
    Some(DocumentMetadata {
        client_name: usable(parsed.client_name),
        session_date: usable(parsed.session_date).and_then(|d| {
            // Normalize whatever date shape the model produced.
            dates::extract_date(&d).extracted_date
        }),
    })
}

fn usable(value: Option<String>) -> Option<String> {
    let value = value?.trim().to_string();
    let lower = value.to_lowercase();
    if value.is_empty() || lower == "null" || lower == "unknown" || lower == "n/a" {
        None
    } else {
        Some(value)
    }
}
