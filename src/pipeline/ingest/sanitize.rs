//! Text hygiene applied between extraction and any LLM call.

/// Normalize extracted text: strip carriage returns and control characters,
/// collapse runs of blank lines, trim trailing space per line.
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;

    for line in raw.replace('\r', "").lines() {
        let line: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let trimmed = line.trim_end();

        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(trimmed);
        out.push('\n');
    }

    out.trim().to_string()
}

/// Clip text to a character limit without splitting a UTF-8 scalar.
pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_blank_line_runs() {
        let raw = "first\n\n\n\n\nsecond\n";
        assert_eq!(clean_text(raw), "first\n\nsecond");
    }

    #[test]
    fn strips_control_characters_and_cr() {
        let raw = "hello\u{0000}world\r\nnext\u{0007} line";
        assert_eq!(clean_text(raw), "helloworld\nnext line");
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let text = "héllo wörld";
        assert_eq!(clip(text, 5), "héllo");
        assert_eq!(clip(text, 100), text);
    }
}
