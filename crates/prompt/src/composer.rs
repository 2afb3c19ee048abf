//! Prompt composition: few-shot guidance, retrieved context, user prompt.

use std::sync::Arc;

use waypost_core::{AppError, AppResult};

use crate::tokens::TokenCounter;

/// Short worked example steering the model toward a trailing-JSON answer.
pub const FEW_SHOT_EXAMPLE: &str = "Example 1:\nQ: I can't login to my account.\nA: You can reset your password by visiting the forgot-password page.\n{\"text\": \"You can reset your password using the forgot-password flow.\", \"actions\": [{\"type\": \"create_ticket\", \"summary\": \"User cannot login; needs password reset\"}]}\n";

/// Trailing instruction pinning the expected answer format.
pub const ANSWER_FORMAT_INSTRUCTION: &str = "\n\nRespond as a helpful assistant. After your human-readable answer, on the LAST LINE append a single JSON object only (no surrounding text) with the schema: {\"text\": \"<short answer>\", \"actions\": [ {\"type\": \"create_ticket\", \"summary\": \"...\"} ] }";

/// One retrieved document rendered into the prompt.
#[derive(Debug, Clone)]
pub struct ContextBlock {
    pub source: String,
    pub text: String,
}

/// Builds the full generation prompt and enforces input limits.
pub struct PromptComposer {
    counter: Arc<TokenCounter>,
    max_input_tokens: usize,
    max_prompt_bytes: usize,
}

impl PromptComposer {
    pub fn new(
        counter: Arc<TokenCounter>,
        max_input_tokens: usize,
        max_prompt_bytes: usize,
    ) -> Self {
        Self {
            counter,
            max_input_tokens,
            max_prompt_bytes,
        }
    }

    /// Compose the final prompt from the user prompt and retrieved context.
    ///
    /// Layout:
    /// 1. Few-shot example
    /// 2. One `Source: <source>` block per retrieved document, when any
    /// 3. The raw user prompt (labelled `User prompt:` when context exists)
    /// 4. The trailing answer-format instruction
    ///
    /// Limits apply to the *user prompt* only and reject rather than
    /// truncate: a UTF-8 byte cap and a token ceiling.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use waypost_prompt::{PromptComposer, TokenCounter};
    ///
    /// let composer = PromptComposer::new(Arc::new(TokenCounter::heuristic()), 800, 51200);
    /// let built = composer.compose("How do refunds work?", &[]).unwrap();
    /// assert!(built.contains("How do refunds work?"));
    /// ```
    pub fn compose(&self, prompt: &str, context: &[ContextBlock]) -> AppResult<String> {
        if prompt.len() > self.max_prompt_bytes {
            tracing::warn!(
                bytes = prompt.len(),
                limit = self.max_prompt_bytes,
                "Rejecting oversized prompt"
            );
            return Err(AppError::PromptTooLarge("Prompt too large".to_string()));
        }

        let tokens = self.counter.count(prompt);
        if tokens > self.max_input_tokens {
            tracing::warn!(
                tokens,
                limit = self.max_input_tokens,
                "Rejecting prompt over token ceiling"
            );
            return Err(AppError::PromptTooLarge(
                "Prompt exceeds maximum token limit".to_string(),
            ));
        }

        tracing::debug!(context_blocks = context.len(), "Composing prompt");

        let augmented = if context.is_empty() {
            prompt.to_string()
        } else {
            let blocks: Vec<String> = context
                .iter()
                .map(|block| format!("Source: {}\n{}\n---\n", block.source, block.text))
                .collect();
            format!("{}\nUser prompt:\n{}", blocks.join("\n"), prompt)
        };

        Ok(format!(
            "{}\n{}{}",
            FEW_SHOT_EXAMPLE, augmented, ANSWER_FORMAT_INSTRUCTION
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer(max_tokens: usize, max_bytes: usize) -> PromptComposer {
        PromptComposer::new(Arc::new(TokenCounter::heuristic()), max_tokens, max_bytes)
    }

    #[test]
    fn test_compose_without_context() {
        let built = composer(800, 51200).compose("Where is my booking?", &[]).unwrap();
        assert_eq!(
            built,
            format!(
                "{}\nWhere is my booking?{}",
                FEW_SHOT_EXAMPLE, ANSWER_FORMAT_INSTRUCTION
            )
        );
    }

    #[test]
    fn test_compose_with_context_blocks() {
        let context = vec![
            ContextBlock {
                source: "refunds.md".to_string(),
                text: "Refunds take five days.".to_string(),
            },
            ContextBlock {
                source: "faq.md".to_string(),
                text: "Contact support for urgent issues.".to_string(),
            },
        ];

        let built = composer(800, 51200)
            .compose("When do I get my refund?", &context)
            .unwrap();

        assert!(built.starts_with(FEW_SHOT_EXAMPLE));
        assert!(built.ends_with(ANSWER_FORMAT_INSTRUCTION));
        assert!(built.contains("Source: refunds.md\nRefunds take five days.\n---\n"));
        assert!(built.contains("---\n\nSource: faq.md"));
        assert!(built.contains("\nUser prompt:\nWhen do I get my refund?"));
    }

    #[test]
    fn test_token_ceiling_rejects() {
        let long_prompt = "x".repeat(400);

        let err = composer(5, 51200).compose(&long_prompt, &[]).unwrap_err();
        assert!(matches!(err, AppError::PromptTooLarge(_)));
        assert_eq!(err.to_string(), "Prompt exceeds maximum token limit");
    }

    #[test]
    fn test_byte_guard_rejects() {
        let long_prompt = "x".repeat(200);

        let err = composer(800, 64).compose(&long_prompt, &[]).unwrap_err();
        assert!(matches!(err, AppError::PromptTooLarge(_)));
        assert_eq!(err.to_string(), "Prompt too large");
    }

    #[test]
    fn test_context_does_not_count_against_ceiling() {
        let context = vec![ContextBlock {
            source: "big.md".to_string(),
            text: "y".repeat(4000),
        }];

        let built = composer(10, 51200).compose("short", &context).unwrap();
        assert!(built.contains("short"));
    }
}
