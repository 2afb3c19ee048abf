//! Generation capability abstraction.
//!
//! This module defines the interface the executor drives; the runtime behind
//! it is an HTTP model runtime or the deterministic fallback.

use waypost_core::AppResult;

/// Sampling parameters forwarded to the model runtime.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for sampling
    pub temperature: f32,

    /// Top-k sampling cutoff
    pub top_k: u32,

    /// Top-p nucleus sampling
    pub top_p: f32,
}

impl GenerationParams {
    /// Parameters with the service's fixed low-variance sampling profile.
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            temperature: 0.2,
            top_k: 10,
            top_p: 0.9,
        }
    }
}

/// Trait for generation backends.
///
/// Implementations are driven through the executor's single execution slot
/// and must tolerate being polled past the caller's deadline.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Get the backend name (e.g., "ollama", "fallback").
    fn name(&self) -> &str;

    /// Context window of the underlying model, in tokens.
    fn context_window(&self) -> usize;

    /// Perform a non-streaming completion.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> AppResult<String>;

    /// Check whether the configured model is actually available.
    async fn probe(&self) -> AppResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sampling_profile() {
        let params = GenerationParams::new(128);
        assert_eq!(params.max_tokens, 128);
        assert_eq!(params.temperature, 0.2);
        assert_eq!(params.top_k, 10);
        assert_eq!(params.top_p, 0.9);
    }
}
