//! Section parser for free-form model output.
//!
//! The ensemble returns one text blob that should contain labeled sections.
//! Model formatting drifts (markdown headers, bold labels, missing sections),
//! so the parser scans line by line for section headers and reports what it
//! could not find instead of papering over gaps.

use std::sync::LazyLock;

use regex::Regex;

/// The section labels a progress note is built from, in canonical order.
pub const SECTION_NAMES: [&str; 9] = [
    "title",
    "subjective",
    "objective",
    "assessment",
    "plan",
    "tonal analysis",
    "key points",
    "significant quotes",
    "narrative summary",
];

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,4}\s*)?(?:\*\*)?\s*(title|subjective|objective|assessment|plan|tonal analysis|key points|significant quotes|narrative summary)\s*(?:\*\*)?\s*:?\s*(.*)$",
    )
    .expect("section header pattern")
});

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").expect("bullet pattern"));

/// Outcome of splitting model output into sections. Missing sections are
/// reported, not silently replaced; placeholder text is the assembler's call.
#[derive(Debug, Clone, Default)]
pub struct ParsedNote {
    pub title: Option<String>,
    pub subjective: Option<String>,
    pub objective: Option<String>,
    pub assessment: Option<String>,
    pub plan: Option<String>,
    pub tonal_analysis: Option<String>,
    pub key_points: Vec<String>,
    pub significant_quotes: Vec<String>,
    pub narrative_summary: Option<String>,
    /// Section labels that never appeared (or appeared empty) in the output.
    pub missing_sections: Vec<String>,
}

impl ParsedNote {
    pub fn is_partial(&self) -> bool {
        !self.missing_sections.is_empty()
    }
}

/// Split model output into sections by scanning for header lines. Content
/// between two headers belongs to the first; text before any header is
/// ignored (models often open with pleasantries).
pub fn parse_sections(output: &str) -> ParsedNote {
    let mut collected: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in output.lines() {
        if let Some(caps) = HEADER.captures(line) {
            if let Some(section) = current.take() {
                collected.push(section);
            }
            let name = caps[1].to_lowercase();
            let inline = caps[2].trim().to_string();
            current = Some((name, inline));
        } else if let Some((_, body)) = current.as_mut() {
            body.push('\n');
            body.push_str(line);
        }
    }
    if let Some(section) = current.take() {
        collected.push(section);
    }

    let mut note = ParsedNote::default();
    for (name, body) in collected {
        let body = clean_section(&body);
        if body.is_empty() {
            continue;
        }
        match name.as_str() {
            "title" => note.title = Some(body),
            "subjective" => note.subjective = Some(body),
            "objective" => note.objective = Some(body),
            "assessment" => note.assessment = Some(body),
            "plan" => note.plan = Some(body),
            "tonal analysis" => note.tonal_analysis = Some(body),
            "key points" => note.key_points = split_bullets(&body),
            "significant quotes" => note.significant_quotes = split_bullets(&body),
            "narrative summary" => note.narrative_summary = Some(body),
            _ => {}
        }
    }

    for name in SECTION_NAMES {
        let present = match name {
            "title" => note.title.is_some(),
            "subjective" => note.subjective.is_some(),
            "objective" => note.objective.is_some(),
            "assessment" => note.assessment.is_some(),
            "plan" => note.plan.is_some(),
            "tonal analysis" => note.tonal_analysis.is_some(),
            "key points" => !note.key_points.is_empty(),
            "significant quotes" => !note.significant_quotes.is_empty(),
            "narrative summary" => note.narrative_summary.is_some(),
            _ => true,
        };
        if !present {
            note.missing_sections.push(name.to_string());
        }
    }

    note
}

/// Strip markdown artifacts and collapse blank-line runs inside a section.
fn clean_section(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut blank_run = 0usize;
    for line in body.lines() {
        let line = line.replace("**", "");
        let line = line.trim_start_matches('#').trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Bullet-ish lines become list entries; fragments under 10 characters are
/// noise (stray dashes, "N/A") and dropped.
fn split_bullets(body: &str) -> Vec<String> {
    let mut items: Vec<String> = body
        .lines()
        .filter_map(|line| {
            BULLET
                .captures(line)
                .map(|caps| caps[1].trim().trim_matches('"').to_string())
        })
        .filter(|item| item.len() >= 10)
        .collect();

    // A section written as plain sentences still counts as one entry each.
    if items.is_empty() {
        items = body
            .lines()
            .map(|l| l.trim().trim_matches('"').to_string())
            .filter(|l| l.len() >= 10)
            .collect();
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_OUTPUT: &str = "\
Here is the structured note you requested.

**Title:** Weekly Session - Anxiety Management

**Subjective:**
Client reported improved sleep but persistent worry about work deadlines.

**Objective:**
Client maintained eye contact; speech was measured and goal-directed.

**Assessment:**
Symptoms consistent with generalized anxiety, trending toward improvement.

**Plan:**
Continue weekly CBT; introduce worry-postponement exercise.

**Tonal Analysis:**
Overall tone was hopeful with intermittent frustration around work topics.

**Key Points:**
- Sleep improved from 4 to 6 hours nightly
- Worry remains centered on job performance
- N/A

**Significant Quotes:**
- \"I finally slept through the night on Tuesday.\"

**Narrative Summary:**
Client continues to engage well with CBT and shows measurable progress.";

    #[test]
    fn full_output_parses_every_section() {
        let note = parse_sections(FULL_OUTPUT);
        assert!(!note.is_partial(), "missing: {:?}", note.missing_sections);
        assert_eq!(
            note.title.as_deref(),
            Some("Weekly Session - Anxiety Management")
        );
        assert!(note.subjective.unwrap().contains("improved sleep"));
        assert!(note.objective.unwrap().contains("eye contact"));
        assert_eq!(note.key_points.len(), 2, "short fragments are dropped");
        assert_eq!(note.significant_quotes.len(), 1);
    }

    #[test]
    fn markdown_header_style_is_accepted() {
        let output = "## Subjective\nClient reported fatigue and low motivation.\n\n## Plan\nSchedule follow-up in two weeks.";
        let note = parse_sections(output);
        assert!(note.subjective.is_some());
        assert!(note.plan.is_some());
        assert!(note.missing_sections.contains(&"objective".to_string()));
    }

    #[test]
    fn missing_sections_are_reported_not_invented() {
        let note = parse_sections("Title: Brief Check-in\n\nPlan: Continue current approach with weekly sessions.");
        assert!(note.is_partial());
        assert!(note.missing_sections.contains(&"subjective".to_string()));
        assert!(note.missing_sections.contains(&"narrative summary".to_string()));
        assert_eq!(note.title.as_deref(), Some("Brief Check-in"));
    }

    #[test]
    fn unstructured_output_reports_everything_missing() {
        let note = parse_sections("The client seemed fine today and we talked about school.");
        assert_eq!(note.missing_sections.len(), SECTION_NAMES.len());
    }

    #[test]
    fn quotes_survive_numbered_lists() {
        let output = "Significant Quotes:\n1. \"I want to get better at this.\"\n2) \"It helps to say it out loud.\"";
        let note = parse_sections(output);
        assert_eq!(note.significant_quotes.len(), 2);
        assert!(note.significant_quotes[0].starts_with("I want"));
    }
}
