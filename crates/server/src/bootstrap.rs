//! Startup wiring.
//!
//! Builds the shared `AppState` from the loaded configuration, then runs
//! the startup sequence: load the persisted index (building it first when
//! artifacts are absent and a document source resolves) and probe the
//! model runtime. Startup never fails on degraded state; the service
//! answers with empty retrieval and fallback text instead.

use std::sync::Arc;

use waypost_core::{AppConfig, AppError};
use waypost_llm::{GenerationExecutor, Generator, HttpGenerator};
use waypost_prompt::{PromptComposer, TokenCounter};
use waypost_retrieval::{AdminRebuilder, IndexStore, Retriever};

use crate::limiter::{LocalRateLimiter, RateLimiter, RedisRateLimiter};
use crate::metrics::ServiceMetrics;
use crate::state::AppState;

/// Build the shared state and run startup preparation.
pub async fn bootstrap(config: AppConfig) -> AppState {
    let state = build_state(config).await;
    prepare(&state).await;
    state
}

/// Construct every shared subsystem from the configuration.
pub async fn build_state(config: AppConfig) -> AppState {
    let config = Arc::new(config);

    let counter = Arc::new(TokenCounter::from_config(config.tokenizer_path.as_deref()));

    let store = IndexStore::new(&config.data_dir);
    let retriever = Arc::new(Retriever::new(store.clone()));
    let rebuilder = Arc::new(
        AdminRebuilder::new(store, config.knowledge_source.clone())
            .with_model(config.model.name.clone(), counter.version()),
    );

    let composer = Arc::new(PromptComposer::new(
        counter.clone(),
        config.max_input_tokens,
        config.body_limit_bytes,
    ));

    let generator: Arc<dyn Generator> = Arc::new(HttpGenerator::new(
        config.model.name.clone(),
        config.model.endpoint.clone(),
        config.model.context_window,
    ));
    let executor = Arc::new(GenerationExecutor::new(
        generator,
        counter.clone(),
        config.model.enabled,
        config.generation_deadline(),
        config.max_input_tokens,
    ));

    let limiter = build_limiter(&config).await;

    AppState {
        config,
        counter,
        retriever,
        rebuilder,
        composer,
        executor,
        limiter,
        metrics: Arc::new(ServiceMetrics::new()),
    }
}

/// Load or build the index, then probe the model.
pub async fn prepare(state: &AppState) {
    let loaded = match state.retriever.reload() {
        Ok(meta) => meta.is_some(),
        Err(e) => {
            tracing::warn!("Failed to load retrieval index at startup: {}", e);
            false
        }
    };

    if !loaded {
        match state.rebuilder.rebuild(None) {
            Ok(outcome) => {
                tracing::info!(
                    documents = outcome.documents,
                    source = %outcome.source.display(),
                    "Built missing index at startup"
                );
                if let Err(e) = state.retriever.reload() {
                    tracing::warn!("Failed to load freshly built index: {}", e);
                }
            }
            Err(AppError::SourceNotFound(tried)) => {
                tracing::warn!("No document source found ({}); retrieval stays empty", tried);
            }
            Err(e) => tracing::warn!("Startup index build failed: {}", e),
        }
    }

    if state.retriever.is_loaded()
        && !state.retriever.verify_compatibility(
            Some(&state.config.model.name),
            Some(state.counter.version()),
        )
    {
        tracing::warn!("Index was built for a different model or tokenizer; consider a rebuild");
    }

    if state.config.model.enabled {
        state.executor.reload().await;
    } else {
        tracing::info!("Model disabled; answering in fallback mode");
    }
}

/// Redis-backed limiter when a URL is configured and reachable, local
/// sliding window otherwise.
async fn build_limiter(config: &AppConfig) -> Arc<dyn RateLimiter> {
    if let Some(url) = config.redis_url.as_deref() {
        match RedisRateLimiter::connect(url, config.rate_limit, config.rate_window()).await {
            Ok(limiter) => {
                tracing::info!("Rate limiting backed by redis");
                return Arc::new(limiter);
            }
            Err(e) => {
                tracing::warn!("Redis unavailable, rate limiting locally: {}", e);
            }
        }
    }
    Arc::new(LocalRateLimiter::new(
        config.rate_limit,
        config.rate_window(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(data_dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.require_api_key = false;
        config.model.enabled = false;
        // Discard port: probes fail fast if anything ever calls out
        config.model.endpoint = "http://127.0.0.1:9".to_string();
        config.data_dir = data_dir.to_path_buf();
        config
    }

    fn write_pack(path: &Path) {
        std::fs::write(
            path,
            r#"[{"text": "apple pie recipe", "source": "pies.md"},
               {"text": "trek packing list", "source": "trek.md"}]"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_without_artifacts_or_source() {
        let dir = tempdir().unwrap();
        let state = bootstrap(test_config(dir.path())).await;

        assert!(!state.retriever.is_loaded());
        assert!(!state.executor.is_loaded());
        assert!(state.limiter.check("10.0.0.1").await);
        assert_eq!(state.retriever.document_count(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_builds_missing_index_from_source() {
        let dir = tempdir().unwrap();
        let pack = dir.path().join("pack.json");
        write_pack(&pack);

        let mut config = test_config(&dir.path().join("data"));
        config.knowledge_source = Some(pack);

        let state = bootstrap(config).await;
        assert!(state.retriever.is_loaded());
        assert_eq!(state.retriever.document_count(), 2);
        assert!(!state.retriever.retrieve("apple pie", 3).is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_reuses_persisted_artifacts() {
        let dir = tempdir().unwrap();
        let pack = dir.path().join("pack.json");
        write_pack(&pack);

        let mut config = test_config(&dir.path().join("data"));
        config.knowledge_source = Some(pack);
        let state = bootstrap(config).await;
        assert_eq!(state.retriever.document_count(), 2);

        // Second boot with no source loads what the first one persisted
        let state = bootstrap(test_config(&dir.path().join("data"))).await;
        assert!(state.retriever.is_loaded());
        assert_eq!(state.retriever.document_count(), 2);
    }
}
