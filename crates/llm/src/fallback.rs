//! Deterministic fallback generation.

use waypost_core::AppResult;

use crate::generator::{GenerationParams, Generator};

/// Prefix identifying output produced without a model.
pub const FALLBACK_MARKER: &str = "[fallback] ";

/// Shortest snippet echoed back, in chars.
const MIN_SNIPPET_CHARS: usize = 40;

/// Longest snippet echoed back, in chars.
const MAX_SNIPPET_CHARS: usize = 300;

/// Marker plus a bounded echo of the prompt. Identical input yields
/// identical output; an all-whitespace prompt yields an empty string.
pub fn fallback_text(prompt: &str) -> String {
    let safe = prompt.trim();
    if safe.is_empty() {
        return String::new();
    }
    let take = MIN_SNIPPET_CHARS.max(MAX_SNIPPET_CHARS.min(safe.chars().count()));
    let snippet: String = safe.chars().take(take).collect();
    format!("{}{}", FALLBACK_MARKER, snippet)
}

/// Generation backend used when no model runtime is available.
pub struct FallbackGenerator {
    context_window: usize,
}

impl FallbackGenerator {
    pub fn new(context_window: usize) -> Self {
        Self { context_window }
    }
}

#[async_trait::async_trait]
impl Generator for FallbackGenerator {
    fn name(&self) -> &str {
        "fallback"
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> AppResult<String> {
        Ok(fallback_text(prompt))
    }
}
