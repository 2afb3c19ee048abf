//! Token counting and tail-retention truncation.
//!
//! Counts are exact when an HF `tokenizer.json` is configured and a byte
//! estimate otherwise, so the service runs without any model assets present.

use std::path::Path;

/// Rough bytes-per-token ratio used when no tokenizer is loaded.
const BYTES_PER_TOKEN: usize = 4;

/// Chars kept per allowed token when truncating without a tokenizer.
const CHARS_PER_TOKEN: usize = 3;

/// Counts tokens and truncates text, tokenizer-backed or estimated.
pub struct TokenCounter {
    tokenizer: Option<tokenizers::Tokenizer>,
    version: String,
}

impl TokenCounter {
    /// Byte-estimate counter with no tokenizer backing.
    pub fn heuristic() -> Self {
        Self {
            tokenizer: None,
            version: "heuristic".to_string(),
        }
    }

    /// Load an HF-format tokenizer file if one is configured.
    ///
    /// A missing or unloadable file degrades to the byte estimate with a
    /// warning rather than failing service startup.
    pub fn from_config(tokenizer_path: Option<&Path>) -> Self {
        let Some(path) = tokenizer_path else {
            return Self::heuristic();
        };

        match tokenizers::Tokenizer::from_file(path) {
            Ok(tokenizer) => {
                tracing::info!(path = %path.display(), "Loaded tokenizer");
                Self {
                    tokenizer: Some(tokenizer),
                    version: format!("hf:{}", path.display()),
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "Failed to load tokenizer, using byte estimate: {}",
                    e
                );
                Self::heuristic()
            }
        }
    }

    pub fn is_tokenizer_backed(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// Identity string recorded in index metadata for compatibility checks.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Token count for `text`, estimated from byte length when no tokenizer
    /// is loaded or encoding fails.
    pub fn count(&self, text: &str) -> usize {
        if let Some(tokenizer) = &self.tokenizer {
            if let Ok(encoding) = tokenizer.encode(text, false) {
                return encoding.len();
            }
        }
        text.len() / BYTES_PER_TOKEN
    }

    /// Keep the most recent `max_tokens` tokens of `text`, discarding the
    /// oldest. Without a tokenizer the tail is approximated in chars.
    pub fn truncate_tail(&self, text: &str, max_tokens: usize) -> String {
        if let Some(tokenizer) = &self.tokenizer {
            if let Ok(encoding) = tokenizer.encode(text, false) {
                let ids = encoding.get_ids();
                if ids.len() <= max_tokens {
                    return text.to_string();
                }
                let keep = &ids[ids.len() - max_tokens..];
                if let Ok(decoded) = tokenizer.decode(keep, true) {
                    return decoded;
                }
            }
        }

        let keep_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
        if keep_chars == 0 {
            return String::new();
        }
        let total = text.chars().count();
        if total <= keep_chars {
            return text.to_string();
        }
        let skip = total - keep_chars;
        let start = text
            .char_indices()
            .nth(skip)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        text[start..].to_string()
    }
}
