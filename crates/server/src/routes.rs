//! HTTP surface of the answering service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::Instrument;
use uuid::Uuid;
use waypost_core::{AppError, AppResult};
use waypost_llm::{assemble_answer, Action, GenerationParams};
use waypost_prompt::ContextBlock;
use waypost_retrieval::ScoredDocument;

use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub text: String,
    pub actions: Vec<Action>,
    pub raw: String,
    pub retrieved_sources: Vec<RetrievedSource>,
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct RetrievedSource {
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub retrieved: Vec<ScoredDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuildIndexRequest {
    pub source_path: Option<PathBuf>,
}

/// Assemble the full router around the shared state.
///
/// The generate, retrieve and admin routes sit behind the API key check;
/// health, readiness and metrics stay open. Every route is wrapped by the
/// request tracker and the body size cap.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/generate", post(generate))
        .route("/retrieve", post(retrieve))
        .route("/admin/reload_model", post(reload_model))
        .route("/admin/reload_index", post(reload_index))
        .route("/admin/build_index", post(build_index))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes));

    if state.config.allow_cors {
        app = app.layer(CorsLayer::permissive());
        tracing::info!("CORS enabled");
    }

    app.with_state(state)
}

/// Bind the configured address and serve until shutdown.
pub async fn serve(state: AppState) -> AppResult<()> {
    let bind = state.config.bind.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind {}: {}", bind, e)))?;
    tracing::info!(%bind, "Waypost answering service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Per-request bookkeeping: assign a request id, time the handler, log the
/// outcome, and feed the counters. The id is echoed as `x-request-id`.
async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let span = tracing::info_span!("request", id = %request_id, method = %method, path = %path);
    let mut response = next.run(request).instrument(span).await;

    let status = response.status().as_u16();
    state.metrics.record_request(&path, status);

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }

    tracing::info!(
        id = %request_id,
        method = %method,
        path = %path,
        status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness: true when generation is intentionally non-local (fallback
/// only) or the model probe has succeeded.
async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    let model_loaded = state.executor.is_loaded();
    Json(serde_json::json!({
        "ready": !state.config.model.enabled || model_loaded,
        "model_local": state.config.model.enabled,
        "model_loaded": model_loaded,
        "retrieval_index_loaded": state.retriever.is_loaded(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics.render(state.retriever.document_count());
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
        .into_response()
}

/// Answer a traveler question: retrieve context, compose, generate,
/// extract the structured tail.
async fn generate(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let identity = peer.ip().to_string();
    if !state.limiter.check(&identity).await {
        state.metrics.record_rate_limited();
        return Err(state.reject(AppError::RateLimited));
    }

    let prompt = req.prompt.trim();
    let max_tokens = req
        .max_tokens
        .unwrap_or(state.config.default_max_tokens)
        .min(state.config.max_output_tokens);
    let top_k = req.top_k.unwrap_or(state.config.default_top_k);

    tracing::info!(max_tokens, top_k, identity = %identity, "Generation request");

    let retrieved = state.retriever.retrieve(prompt, top_k);
    let context: Vec<ContextBlock> = retrieved
        .iter()
        .map(|hit| ContextBlock {
            source: hit.document.source.clone(),
            text: hit.document.text.clone(),
        })
        .collect();

    let composed = state
        .composer
        .compose(prompt, &context)
        .map_err(|e| state.reject(e))?;

    let started = Instant::now();
    let raw = match state
        .executor
        .generate(&composed, GenerationParams::new(max_tokens))
        .await
    {
        Ok(raw) => raw,
        Err(e @ AppError::GenerationTimeout(_)) => {
            state.metrics.record_timeout();
            return Err(state.reject(e));
        }
        Err(e) => return Err(state.reject(e)),
    };
    state.metrics.record_generation(started.elapsed());

    let fallback_mode = state.executor.fallback_mode(&raw);
    if fallback_mode {
        state.metrics.record_fallback();
    }
    let answer = assemble_answer(&raw, fallback_mode, prompt, &context);

    let retrieved_sources = retrieved
        .iter()
        .map(|hit| RetrievedSource {
            source: hit.document.source.clone(),
            score: hit.score,
        })
        .collect();

    Ok(Json(GenerateResponse {
        text: answer.text,
        actions: answer.actions,
        raw,
        retrieved_sources,
        mode: if fallback_mode { "fallback" } else { "model" }.to_string(),
    }))
}

/// Rank documents against a query without generating anything.
async fn retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Json<RetrieveResponse> {
    let top_k = req.top_k.unwrap_or(state.config.default_top_k);
    let retrieved = state.retriever.retrieve(&req.query, top_k);
    Json(RetrieveResponse { retrieved })
}

/// Re-probe the model runtime and report whether the model is available.
async fn reload_model(State(state): State<AppState>) -> Json<serde_json::Value> {
    let reloaded = state.executor.reload().await;
    Json(serde_json::json!({ "reloaded": reloaded }))
}

/// Reload the index artifacts from disk and swap them in.
async fn reload_index(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.retriever.reload() {
        Ok(meta) => Ok(Json(serde_json::json!({
            "reloaded": meta.is_some(),
            "meta": meta,
        }))),
        Err(e) => {
            tracing::error!("Reload index failed: {}", e);
            Err(ApiError::internal("Reload index failed"))
        }
    }
}

/// Rebuild the index from a document source, then load the fresh artifacts.
async fn build_index(
    State(state): State<AppState>,
    Json(req): Json<BuildIndexRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rebuilder = state.rebuilder.clone();
    let source = req.source_path;

    let outcome = tokio::task::spawn_blocking(move || rebuilder.rebuild(source.as_deref()))
        .await
        .map_err(|e| {
            tracing::error!("Index build task failed: {}", e);
            ApiError::internal("Index build failed")
        })?
        .map_err(|e| match e {
            AppError::SourceNotFound(_) => state.reject(e),
            e => {
                tracing::error!("Index build failed: {}", e);
                ApiError::internal("Index build failed")
            }
        })?;

    state.retriever.reload().map_err(|e| {
        tracing::error!("Reload after build failed: {}", e);
        ApiError::internal("Reload index failed")
    })?;

    Ok(Json(serde_json::json!({
        "built": true,
        "documents": outcome.documents,
        "source": outcome.source.display().to_string(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::path::Path;
    use tempfile::tempdir;
    use waypost_core::AppConfig;
    use waypost_llm::FALLBACK_MARKER;
    use waypost_retrieval::IndexStore;

    use crate::bootstrap;

    fn test_config(data_dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.require_api_key = false;
        config.model.enabled = false;
        config.model.endpoint = "http://127.0.0.1:9".to_string();
        config.data_dir = data_dir.to_path_buf();
        config
    }

    async fn state_with(config: AppConfig) -> AppState {
        bootstrap::build_state(config).await
    }

    fn seed_index(data_dir: &Path) {
        let store = IndexStore::new(data_dir);
        let texts = vec![
            "apple pie recipe".to_string(),
            "trek packing list".to_string(),
        ];
        let metadata = ["pies.md", "trek.md"]
            .iter()
            .map(|source| {
                let mut entry = serde_json::Map::new();
                entry.insert(
                    "source".to_string(),
                    serde_json::Value::String(source.to_string()),
                );
                entry
            })
            .collect();
        store.build(texts, metadata, None, None).unwrap();
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("127.0.0.1:4000".parse().unwrap())
    }

    #[tokio::test]
    async fn test_health_payload() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_when_generation_is_fallback_only() {
        let dir = tempdir().unwrap();
        let state = state_with(test_config(dir.path())).await;

        let Json(body) = ready(State(state)).await;
        assert_eq!(body["ready"], true);
        assert_eq!(body["model_local"], false);
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["retrieval_index_loaded"], false);
    }

    #[tokio::test]
    async fn test_not_ready_when_enabled_model_absent() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.model.enabled = true;

        let state = state_with(config).await;
        let Json(body) = ready(State(state)).await;
        assert_eq!(body["ready"], false);
        assert_eq!(body["model_local"], true);
    }

    #[tokio::test]
    async fn test_generate_fallback_without_context() {
        let dir = tempdir().unwrap();
        let state = state_with(test_config(dir.path())).await;

        let req = GenerateRequest {
            prompt: "How do I change my booking?".to_string(),
            max_tokens: None,
            top_k: None,
        };
        let Json(resp) = generate(State(state), peer(), Json(req)).await.unwrap();

        assert_eq!(resp.mode, "fallback");
        assert!(resp.raw.starts_with(FALLBACK_MARKER));
        assert!(resp.actions.is_empty());
        assert!(resp.retrieved_sources.is_empty());
        assert!(resp.text.contains("contact our support team"));
        assert!(resp.text.contains("more specific question"));
    }

    #[tokio::test]
    async fn test_generate_cites_retrieved_sources() {
        let dir = tempdir().unwrap();
        seed_index(dir.path());
        let state = state_with(test_config(dir.path())).await;
        bootstrap::prepare(&state).await;

        let req = GenerateRequest {
            prompt: "apple pie recipe".to_string(),
            max_tokens: None,
            top_k: None,
        };
        let Json(resp) = generate(State(state), peer(), Json(req)).await.unwrap();

        assert_eq!(resp.mode, "fallback");
        assert_eq!(resp.retrieved_sources[0].source, "pies.md");
        assert!(resp.retrieved_sources[0].score > 0.0);
        assert!(resp.text.contains("From pies.md"));
        assert!(resp.text.contains("You asked: apple pie recipe"));
    }

    #[tokio::test]
    async fn test_generate_rate_limited_is_429() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.rate_limit = 1;

        let state = state_with(config).await;
        let req = || GenerateRequest {
            prompt: "hello".to_string(),
            max_tokens: None,
            top_k: None,
        };

        generate(State(state.clone()), peer(), Json(req()))
            .await
            .unwrap();
        let err = generate(State(state), peer(), Json(req()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.detail(), "Rate limit exceeded");
    }

    #[tokio::test]
    async fn test_generate_oversized_prompt_is_413() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.max_input_tokens = 4;

        let state = state_with(config).await;
        let req = GenerateRequest {
            prompt: "a very long prompt that streams well past four heuristic tokens".to_string(),
            max_tokens: None,
            top_k: None,
        };
        let err = generate(State(state), peer(), Json(req)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.detail(), "Prompt exceeds maximum token limit");
    }

    #[tokio::test]
    async fn test_retrieve_returns_scored_documents() {
        let dir = tempdir().unwrap();
        seed_index(dir.path());
        let state = state_with(test_config(dir.path())).await;
        state.retriever.reload().unwrap();

        let req = RetrieveRequest {
            query: "apple pie".to_string(),
            top_k: Some(2),
        };
        let Json(resp) = retrieve(State(state), Json(req)).await;

        assert!(!resp.retrieved.is_empty());
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value["retrieved"][0]["score"].is_number());
        assert_eq!(value["retrieved"][0]["doc"]["source"], "pies.md");
    }

    #[tokio::test]
    async fn test_retrieve_empty_without_index() {
        let dir = tempdir().unwrap();
        let state = state_with(test_config(dir.path())).await;

        let req = RetrieveRequest {
            query: "anything".to_string(),
            top_k: None,
        };
        let Json(resp) = retrieve(State(state), Json(req)).await;
        assert!(resp.retrieved.is_empty());
    }

    #[tokio::test]
    async fn test_reload_model_reports_unavailable_runtime() {
        let dir = tempdir().unwrap();
        let state = state_with(test_config(dir.path())).await;

        let Json(body) = reload_model(State(state)).await;
        assert_eq!(body["reloaded"], false);
    }

    #[tokio::test]
    async fn test_reload_index_reports_absence() {
        let dir = tempdir().unwrap();
        let state = state_with(test_config(dir.path())).await;

        let Json(body) = reload_index(State(state)).await.unwrap();
        assert_eq!(body["reloaded"], false);
        assert!(body["meta"].is_null());
    }

    #[tokio::test]
    async fn test_reload_index_returns_meta() {
        let dir = tempdir().unwrap();
        seed_index(dir.path());
        let state = state_with(test_config(dir.path())).await;

        let Json(body) = reload_index(State(state)).await.unwrap();
        assert_eq!(body["reloaded"], true);
        assert_eq!(body["meta"]["document_count"], 2);
    }

    #[tokio::test]
    async fn test_build_index_endpoint_builds_and_loads() {
        let dir = tempdir().unwrap();
        let pack = dir.path().join("pack.json");
        std::fs::write(
            &pack,
            r#"[{"text": "visa paperwork help", "source": "visa.md"},
               {"text": "airport transfer guide", "source": "transfer.md"}]"#,
        )
        .unwrap();

        let mut config = test_config(&dir.path().join("data"));
        config.knowledge_source = Some(pack);
        let state = state_with(config).await;

        let Json(body) = build_index(
            State(state.clone()),
            Json(BuildIndexRequest::default()),
        )
        .await
        .unwrap();

        assert_eq!(body["built"], true);
        assert_eq!(body["documents"], 2);
        assert!(body["source"].as_str().unwrap().ends_with("pack.json"));
        assert!(state.retriever.is_loaded());
    }

    #[tokio::test]
    async fn test_build_index_missing_source_is_404() {
        let dir = tempdir().unwrap();
        let state = state_with(test_config(dir.path())).await;

        let err = build_index(State(state), Json(BuildIndexRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_build_index_override_path_wins() {
        let dir = tempdir().unwrap();
        let pack = dir.path().join("override.json");
        std::fs::write(
            &pack,
            r#"[{"text": "travel insurance basics"},
               {"text": "lost luggage claims"}]"#,
        )
        .unwrap();

        let state = state_with(test_config(&dir.path().join("data"))).await;
        let Json(body) = build_index(
            State(state),
            Json(BuildIndexRequest {
                source_path: Some(pack),
            }),
        )
        .await
        .unwrap();

        assert_eq!(body["built"], true);
        assert_eq!(body["documents"], 2);
    }

    #[tokio::test]
    async fn test_router_assembles() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.allow_cors = true;
        let state = state_with(config).await;
        let _app = router(state);
    }
}
