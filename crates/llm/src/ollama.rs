//! Ollama-compatible HTTP generation backend.
//!
//! Speaks the non-streaming `/api/generate` endpoint and probes model
//! availability through `/api/tags`.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use serde::{Deserialize, Serialize};
use waypost_core::{AppError, AppResult};

use crate::generator::{GenerationParams, Generator};

/// Generate request format.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    num_predict: u32,
}

/// Generate response format (non-streaming).
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// `/api/tags` response format.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// HTTP client for an Ollama-compatible model runtime.
pub struct HttpGenerator {
    /// Model identifier (e.g., "llama3.2")
    model: String,

    /// Base URL for the runtime API
    endpoint: String,

    /// Context window of the model, in tokens
    context_window: usize,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(
        model: impl Into<String>,
        endpoint: impl Into<String>,
        context_window: usize,
    ) -> Self {
        Self {
            model: model.into(),
            endpoint: endpoint.into(),
            context_window,
            client: reqwest::Client::new(),
        }
    }

    fn to_generate_request(&self, prompt: &str, params: &GenerationParams) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                top_k: params.top_k,
                top_p: params.top_p,
                num_predict: params.max_tokens,
            },
        }
    }

    /// True when `tag` refers to the configured model, with or without a
    /// variant suffix ("llama3.2" matches "llama3.2:latest").
    fn matches_model(&self, tag: &str) -> bool {
        tag == self.model || tag.split(':').next() == Some(self.model.as_str())
    }
}

#[async_trait::async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> AppResult<String> {
        tracing::debug!(model = %self.model, "Sending generate request");

        let request = self.to_generate_request(prompt, params);
        let url = format!("{}/api/generate", self.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to reach model runtime: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Generation(format!(
                "Model runtime error ({}): {}",
                status, error_text
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to parse runtime response: {}", e)))?;

        tracing::debug!(model = %self.model, "Received generate response");

        Ok(body.response)
    }

    async fn probe(&self) -> AppResult<bool> {
        let url = format!("{}/api/tags", self.endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to reach model runtime: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Generation(format!(
                "Model runtime error ({})",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to parse tags response: {}", e)))?;

        Ok(tags.models.iter().any(|m| self.matches_model(&m.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_creation() {
        let generator = HttpGenerator::new("llama3.2", "http://127.0.0.1:11434", 1024);
        assert_eq!(generator.name(), "llama3.2");
        assert_eq!(generator.context_window(), 1024);
    }

    #[test]
    fn test_request_conversion() {
        let generator = HttpGenerator::new("llama3.2", "http://127.0.0.1:11434", 1024);
        let request = generator.to_generate_request("Hello", &GenerationParams::new(100));

        assert_eq!(request.model, "llama3.2");
        assert_eq!(request.prompt, "Hello");
        assert!(!request.stream);
        assert_eq!(request.options.num_predict, 100);
        assert_eq!(request.options.temperature, 0.2);
    }

    #[test]
    fn test_model_tag_matching() {
        let generator = HttpGenerator::new("llama3.2", "http://127.0.0.1:11434", 1024);
        assert!(generator.matches_model("llama3.2"));
        assert!(generator.matches_model("llama3.2:latest"));
        assert!(!generator.matches_model("mistral"));
        assert!(!generator.matches_model("llama3"));
    }
}
