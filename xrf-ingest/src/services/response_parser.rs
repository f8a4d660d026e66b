//! Extraction of grouping payloads from free-text provider responses
//!
//! Providers may wrap JSON in a fenced code block, embed it in commentary, or
//! return bare JSON. Candidates are tried in this order:
//! 1. Content of the first fenced code block
//! 2. First balanced `{...}` span
//! 3. The whole trimmed text
//!
//! The first candidate that decodes as a grouping payload wins.

use serde::Deserialize;

use super::grouping_client::{GroupingError, NameGroup};
use crate::models::clamp_confidence;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupingPayload {
    Wrapped { groups: Vec<RawGroup> },
    Bare(Vec<RawGroup>),
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    canonical: String,
    #[serde(default)]
    variants: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// Parse provider text into name groups
///
/// # Errors
/// [`GroupingError::Parse`] when no candidate decodes.
pub fn parse_groups(text: &str) -> Result<Vec<NameGroup>, GroupingError> {
    for candidate in json_candidates(text) {
        if let Ok(payload) = serde_json::from_str::<GroupingPayload>(candidate) {
            let raw_groups = match payload {
                GroupingPayload::Wrapped { groups } => groups,
                GroupingPayload::Bare(groups) => groups,
            };
            return Ok(raw_groups
                .into_iter()
                .filter_map(|g| {
                    let canonical = g.canonical.trim().to_string();
                    if canonical.is_empty() {
                        return None;
                    }
                    Some(NameGroup {
                        canonical,
                        variants: g.variants,
                        confidence: clamp_confidence(g.confidence),
                    })
                })
                .collect());
        }
    }

    let preview: String = text.chars().take(120).collect();
    Err(GroupingError::Parse(format!(
        "no grouping JSON found in response: {:?}",
        preview
    )))
}

/// Candidate JSON substrings, in priority order
pub fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::with_capacity(3);

    if let Some(block) = first_fenced_block(text) {
        candidates.push(block);
    }
    if let Some(span) = first_balanced_object(text) {
        candidates.push(span);
    }
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        candidates.push(trimmed);
    }

    candidates
}

/// Content of the first ``` fenced block, without the info string
///
/// Text on the fence line is an info string only when it is a bare word
/// (`json`, `JSON`, `json5`); otherwise it is the start of the payload.
fn first_fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let line_end = after_fence.find('\n').unwrap_or(after_fence.len());
    let first_line = after_fence[..line_end].trim();

    let body = if is_info_string(first_line) {
        after_fence.get(line_end + 1..).unwrap_or("")
    } else {
        after_fence
    };
    let close = body.find("```")?;
    Some(body[..close].trim())
}

fn is_info_string(line: &str) -> bool {
    line.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+')
}

/// First `{...}` span with balanced braces, ignoring braces inside strings
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}
