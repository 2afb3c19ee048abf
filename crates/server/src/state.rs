//! Shared handles for request handlers.

use std::sync::Arc;

use waypost_core::{AppConfig, AppError};
use waypost_llm::GenerationExecutor;
use waypost_prompt::{PromptComposer, TokenCounter};
use waypost_retrieval::{AdminRebuilder, Retriever};

use crate::error::ApiError;
use crate::limiter::RateLimiter;
use crate::metrics::ServiceMetrics;

/// Everything a handler needs, built once at startup.
///
/// Cloning is cheap: every field is an `Arc`. No subsystem reads global
/// state after construction.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub counter: Arc<TokenCounter>,
    pub retriever: Arc<Retriever>,
    pub rebuilder: Arc<AdminRebuilder>,
    pub composer: Arc<PromptComposer>,
    pub executor: Arc<GenerationExecutor>,
    pub limiter: Arc<dyn RateLimiter>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Map a service error to its client-visible form, with the configured
    /// secret redacted.
    pub fn reject(&self, err: AppError) -> ApiError {
        ApiError::from_app(&err, self.config.service_key.as_deref())
    }
}
