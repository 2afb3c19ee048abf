//! Timeout-bounded generation on a single execution slot.
//!
//! The model runtime is not assumed safe for concurrent invocation, so every
//! generation call queues for one semaphore permit. The caller's deadline
//! covers both the queue wait and the call itself; an expired call is
//! abandoned but the underlying task keeps the permit until it finishes, so
//! the slot may stay busy past a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use waypost_core::{AppError, AppResult};
use waypost_prompt::TokenCounter;

use crate::extract::is_fallback_output;
use crate::fallback::fallback_text;
use crate::generator::{GenerationParams, Generator};

/// Tokens reserved beyond the requested output when sizing the input.
const SAFETY_MARGIN: usize = 16;

/// Drives the generation backend under the service's resource model.
pub struct GenerationExecutor {
    generator: Arc<dyn Generator>,
    counter: Arc<TokenCounter>,
    slot: Arc<Semaphore>,
    deadline: Duration,
    max_input_tokens: usize,
    enabled: bool,
    loaded: AtomicBool,
}

impl GenerationExecutor {
    pub fn new(
        generator: Arc<dyn Generator>,
        counter: Arc<TokenCounter>,
        enabled: bool,
        deadline: Duration,
        max_input_tokens: usize,
    ) -> Self {
        Self {
            generator,
            counter,
            slot: Arc::new(Semaphore::new(1)),
            deadline,
            max_input_tokens,
            enabled,
            loaded: AtomicBool::new(false),
        }
    }

    /// Re-probe the backend and record whether the model is available.
    pub async fn reload(&self) -> bool {
        let loaded = match self.generator.probe().await {
            Ok(present) => present,
            Err(e) => {
                tracing::warn!("Model probe failed: {}", e);
                false
            }
        };
        self.loaded.store(loaded, Ordering::SeqCst);
        if loaded {
            tracing::info!(model = self.generator.name(), "Model available");
        } else {
            tracing::warn!(
                model = self.generator.name(),
                "Model not available, answering in fallback mode"
            );
        }
        loaded
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn model_name(&self) -> &str {
        self.generator.name()
    }

    /// Whether the answer pipeline must treat `raw` as untrusted output.
    pub fn fallback_mode(&self, raw: &str) -> bool {
        !self.enabled || !self.is_loaded() || is_fallback_output(raw)
    }

    /// Input budget left once the requested output and a safety margin are
    /// reserved out of the context window.
    fn allowed_input_tokens(&self, max_tokens: u32) -> usize {
        let reserve = max_tokens as usize + SAFETY_MARGIN;
        self.max_input_tokens
            .min(self.generator.context_window().saturating_sub(reserve))
            .max(1)
    }

    /// Generate a completion for the composed prompt.
    ///
    /// The prompt is tail-truncated to the input budget before the call.
    /// A deadline elapse surfaces `AppError::GenerationTimeout`; any other
    /// backend failure degrades to deterministic fallback text and never
    /// raises. When generation is disabled or the model is absent the
    /// backend is not invoked at all.
    pub async fn generate(&self, prompt: &str, params: GenerationParams) -> AppResult<String> {
        if !self.enabled || !self.is_loaded() {
            return Ok(fallback_text(prompt));
        }

        let allowed = self.allowed_input_tokens(params.max_tokens);
        let truncated = self.counter.truncate_tail(prompt, allowed);

        let generator = Arc::clone(&self.generator);
        let slot = Arc::clone(&self.slot);

        let handle = tokio::spawn(async move {
            let _permit = slot
                .acquire_owned()
                .await
                .map_err(|_| AppError::Generation("Execution slot closed".to_string()))?;
            generator.generate(&truncated, &params).await
        });

        match tokio::time::timeout(self.deadline, handle).await {
            Ok(Ok(Ok(raw))) => Ok(raw),
            Ok(Ok(Err(e))) => {
                tracing::error!("Generation failed: {}", e);
                Ok(fallback_text(prompt))
            }
            Ok(Err(e)) => {
                tracing::error!("Generation task failed: {}", e);
                Ok(fallback_text(prompt))
            }
            Err(_) => {
                tracing::error!(
                    "Generation timed out after {} seconds",
                    self.deadline.as_secs()
                );
                Err(AppError::GenerationTimeout(self.deadline.as_secs()))
            }
        }
    }
}
