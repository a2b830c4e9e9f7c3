//! Prompt for structured progress-note generation.

pub const NOTE_SYSTEM: &str = "You are a licensed therapist writing clinical \
documentation. Produce professional, factual progress notes grounded only in \
the provided session material. Never invent clinical details.";

/// Build the note-generation prompt. The section labels here must stay in
/// sync with the parser's recognized headers.
pub fn progress_note_prompt(transcript: &str, client_name: Option<&str>) -> String {
    let client_line = match client_name {
        Some(name) => format!("Client: {name}\n"),
        None => String::new(),
    };
    format!(
        "{client_line}Write a structured therapy progress note from the session \
material below. Use exactly these labeled sections, each on its own line:\n\
\n\
Title: a short descriptive session title\n\
Subjective: the client's reported experience, concerns, and statements\n\
Objective: observable presentation, affect, and behavior\n\
Assessment: clinical impressions and progress relative to treatment goals\n\
Plan: next steps, interventions, homework, and scheduling\n\
Tonal Analysis: emotional tone and shifts across the session\n\
Key Points: 3-6 bullet points of the most clinically relevant facts\n\
Significant Quotes: direct client quotes worth preserving, as bullets\n\
Narrative Summary: one paragraph summarizing the session\n\
\n\
Session material:\n\
{transcript}"
    )
}
