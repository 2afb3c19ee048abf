//! Extracting the structured answer from raw model output.
//!
//! The model is instructed to end its response with a single JSON object.
//! Real outputs drift from that, so extraction scans for the last parseable
//! object, repairs near-JSON, and validates any requested actions against an
//! allow-list. When the service runs without a model the answer is
//! synthesized deterministically from the retrieved context instead.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypost_prompt::ContextBlock;

use crate::fallback::FALLBACK_MARKER;

/// Action types the platform will execute.
const ALLOWED_ACTION_TYPES: &[&str] = &["create_ticket"];

/// Longest action summary carried through, in chars.
const MAX_SUMMARY_CHARS: usize = 1000;

/// Documents quoted in a synthesized fallback answer.
const FALLBACK_CONTEXT_DOCS: usize = 3;

/// Longest document excerpt quoted, in chars.
const MAX_EXCERPT_CHARS: usize = 500;

/// Longest prompt echo in a synthesized answer, in chars.
const MAX_PROMPT_ECHO_CHARS: usize = 200;

const FALLBACK_CONTACT_LINE: &str = "I wasn't able to generate a complete answer right now. If you need immediate help, please contact our support team.";

const FALLBACK_NO_CONTEXT_LINE: &str = "I couldn't find anything relevant in our help articles. Could you ask a more specific question about your trip or booking?";

static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

/// A validated platform action requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: String,
}

/// Final answer assembled from raw output.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub actions: Vec<Action>,
}

/// Balanced `{...}` spans, rightmost start first.
///
/// The forward scan is string-literal and escape aware, so braces inside
/// JSON strings do not affect nesting depth. Byte offsets are returned;
/// the interesting delimiters are all ASCII so slicing stays on char
/// boundaries.
fn candidate_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();

    for start in (0..bytes.len()).rev() {
        if bytes[start] != b'{' {
            continue;
        }

        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        spans.push((start, i + 1));
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    spans
}

/// Two textual repairs for near-JSON model output: unescaped single quotes
/// become double quotes, and trailing commas before a closing brace or
/// bracket are removed.
fn repair_json_text(s: &str) -> String {
    let mut repaired = String::with_capacity(s.len());
    let mut prev_backslash = false;
    for ch in s.chars() {
        if ch == '\'' && !prev_backslash {
            repaired.push('"');
        } else {
            repaired.push(ch);
        }
        prev_backslash = ch == '\\';
    }

    TRAILING_COMMA_RE.replace_all(&repaired, "$1").into_owned()
}

/// Strict parse, then one retry after repairs.
fn parse_candidate(candidate: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }
    serde_json::from_str(&repair_json_text(candidate)).ok()
}

/// Extract the last JSON object from raw model output.
///
/// Candidates are tried rightmost first. A parsed candidate is widened to an
/// enclosing span only when that wider span also parses, so a full trailing
/// object wins over a nested object inside it; the scan stops at the first
/// parsed candidate that does not contain the current best, so objects
/// earlier in the output (such as an echoed example) are never preferred.
pub fn extract_last_json(text: &str) -> Option<Value> {
    let mut best: Option<((usize, usize), Value)> = None;

    for (start, end) in candidate_spans(text) {
        let Some(parsed) = parse_candidate(&text[start..end]) else {
            continue;
        };
        match &best {
            None => best = Some(((start, end), parsed)),
            Some(((best_start, best_end), _)) => {
                if start <= *best_start && end >= *best_end {
                    best = Some(((start, end), parsed));
                } else {
                    break;
                }
            }
        }
    }

    best.map(|(_, value)| value)
}

/// Keep only well-formed actions with an allow-listed type.
///
/// Entries that are not objects, lack a `type` key, or request an unknown
/// type are dropped silently. Summaries are truncated to
/// [`MAX_SUMMARY_CHARS`] chars; a missing summary becomes empty.
pub fn validate_actions(actions: Option<&Value>) -> Vec<Action> {
    let Some(entries) = actions.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let kind = obj.get("type")?.as_str()?;
            if !ALLOWED_ACTION_TYPES.contains(&kind) {
                return None;
            }
            let summary = obj
                .get("summary")
                .and_then(|v| v.as_str())
                .map(|s| s.chars().take(MAX_SUMMARY_CHARS).collect())
                .unwrap_or_default();
            Some(Action {
                kind: kind.to_string(),
                summary,
            })
        })
        .collect()
}

/// Deterministic answer used when no model output is trustworthy.
///
/// Identical inputs produce byte-identical output.
pub fn synthesize_fallback_answer(prompt: &str, context: &[ContextBlock]) -> String {
    let mut lines = vec![FALLBACK_CONTACT_LINE.to_string()];

    if context.is_empty() {
        lines.push(FALLBACK_NO_CONTEXT_LINE.to_string());
    } else {
        for block in context.iter().take(FALLBACK_CONTEXT_DOCS) {
            let excerpt: String = block.text.chars().take(MAX_EXCERPT_CHARS).collect();
            lines.push(format!("- From {}: {}", block.source, excerpt));
        }
        let echo: String = prompt.chars().take(MAX_PROMPT_ECHO_CHARS).collect();
        lines.push(format!("You asked: {}", echo));
    }

    lines.join("\n")
}

/// Assemble the final answer for a request.
///
/// In fallback mode JSON extraction is bypassed entirely. In model mode the
/// answer text is the extracted object's non-empty `text` field, or the full
/// raw output when extraction finds nothing usable.
pub fn assemble_answer(
    raw: &str,
    fallback_mode: bool,
    prompt: &str,
    context: &[ContextBlock],
) -> Answer {
    if fallback_mode {
        return Answer {
            text: synthesize_fallback_answer(prompt, context),
            actions: Vec::new(),
        };
    }

    match extract_last_json(raw) {
        Some(obj) => {
            let text = obj
                .get("text")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .unwrap_or_else(|| raw.to_string());
            let actions = validate_actions(obj.get("actions"));
            Answer { text, actions }
        }
        None => Answer {
            text: raw.to_string(),
            actions: Vec::new(),
        },
    }
}

/// True when the pipeline must answer without trusting model output.
pub fn is_fallback_output(raw: &str) -> bool {
    raw.starts_with(FALLBACK_MARKER)
}
