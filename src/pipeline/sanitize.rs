// Sanitize document-derived text before it is quoted back into a prompt.
// Extracted fields come from an image the patient uploaded; anything in them
// may be an injection attempt.

/// Maximum length of one quoted field (characters).
const MAX_FIELD_LENGTH: usize = 500;

/// Maximum length of a free-text block (characters).
const MAX_BLOCK_LENGTH: usize = 20_000;

/// Sanitize a multi-line block: strip invisible characters, drop injection
/// lines, normalize whitespace, truncate.
pub fn sanitize_block(raw: &str) -> String {
    let cleaned = remove_invisible_chars(raw);
    let (kept, removed) = remove_injection_lines(&cleaned);
    if removed > 0 {
        // Count only; never log the content.
        tracing::warn!(
            removed_lines = removed,
            "Injection patterns removed from document text"
        );
    }
    truncate_chars(&normalize_whitespace(&kept), MAX_BLOCK_LENGTH)
}

/// Sanitize a single extracted value (test name, drug name, dosage).
///
/// Newlines collapse to spaces so a field cannot open a new prompt line, and
/// a leading role marker is neutralized.
pub fn sanitize_field(raw: &str) -> String {
    let cleaned = remove_invisible_chars(raw);
    let flat = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = flat.to_lowercase();
    let neutral = if is_role_marker(&lower) || is_override_attempt(&lower) {
        tracing::warn!("Injection pattern neutralized in extracted field");
        String::from("[removed]")
    } else {
        flat
    };
    truncate_chars(&neutral, MAX_FIELD_LENGTH)
}

/// Remove zero-width, bidi-override and control characters.
/// Standard whitespace (space, newline, tab) is kept.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t' | '\r') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

fn is_role_marker(trimmed: &str) -> bool {
    const MARKERS: &[&str] = &[
        "system:",
        "assistant:",
        "user:",
        "[system]",
        "[assistant]",
        "[inst]",
        "[/inst]",
        "<<sys>>",
        "<|im_start|>",
        "note to ai:",
        "instructions:",
        "system update:",
    ];
    MARKERS.iter().any(|m| trimmed.starts_with(m))
}

fn is_override_attempt(text: &str) -> bool {
    const PHRASES: &[&str] = &[
        "ignore previous instructions",
        "ignore all instructions",
        "ignore the above instructions",
        "disregard your instructions",
        "disregard all instructions",
        "forget your instructions",
        "new instructions:",
        "override:",
        "set risk level",
        "change the risk level",
    ];
    PHRASES.iter().any(|p| text.contains(p))
}

fn is_xml_instruction_tag(trimmed: &str) -> bool {
    trimmed.starts_with("<instruction")
        || trimmed.starts_with("</instruction")
        || trimmed.starts_with("<system")
        || trimmed.starts_with("</system")
        || trimmed.starts_with("</data")
}

/// Drop lines that look like prompt injection. Returns (kept, removed_count).
fn remove_injection_lines(text: &str) -> (String, usize) {
    let mut kept = Vec::new();
    let mut removed = 0usize;
    for line in text.lines() {
        let trimmed = line.trim().to_lowercase();
        if is_role_marker(&trimmed) || is_override_attempt(&trimmed) || is_xml_instruction_tag(&trimmed)
        {
            removed += 1;
        } else {
            kept.push(line);
        }
    }
    (kept.join("\n"), removed)
}

/// Collapse runs of blank lines and trim each line.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = true;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_blank {
                lines.push("");
            }
            prev_blank = true;
        } else {
            lines.push(trimmed);
            prev_blank = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}…[TRUNCATED]", &text[..cut]),
    }
}
