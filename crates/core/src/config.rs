//! Configuration management for the Waypost answering service.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (waypost.yaml)
//! - Environment variables (`WAYPOST_*`)
//!
//! Environment variables win over the config file, which wins over defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Minimum accepted length for the service API key.
pub const MIN_SERVICE_KEY_LEN: usize = 32;

/// Main application configuration.
///
/// One instance is built at startup and shared (read-only) by every
/// subsystem; nothing reads the environment after this is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listen address for the HTTP server
    pub bind: String,

    /// Shared secret expected in the x-api-key header
    pub service_key: Option<String>,

    /// Whether the generate endpoint requires an API key
    pub require_api_key: bool,

    /// Generation model settings
    pub model: ModelConfig,

    /// Directory holding the persisted index artifacts
    pub data_dir: PathBuf,

    /// Preferred document source for index rebuilds
    pub knowledge_source: Option<PathBuf>,

    /// Optional HF tokenizer.json used for exact token counting
    pub tokenizer_path: Option<PathBuf>,

    /// Redis connection URL for the distributed rate limiter
    pub redis_url: Option<String>,

    /// Wall-clock deadline for a single generation call, in seconds
    pub gen_timeout_secs: u64,

    /// Requests admitted per identity per window
    pub rate_limit: u32,

    /// Rate-limit window length, in seconds
    pub rate_window_secs: u64,

    /// Ceiling on user prompt size, in tokens
    pub max_input_tokens: usize,

    /// Hard cap on requested output tokens
    pub max_output_tokens: u32,

    /// Output tokens used when a request does not ask for a count
    pub default_max_tokens: u32,

    /// Retrieval depth used when a request does not ask for one
    pub default_top_k: usize,

    /// Maximum accepted request body, in bytes
    pub body_limit_bytes: usize,

    /// Attach a permissive CORS layer
    pub allow_cors: bool,

    /// Log level override
    pub log_level: Option<String>,

    /// Disable colored output
    pub no_color: bool,
}

/// Generation model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// When false the service runs in fallback mode only
    pub enabled: bool,

    /// Model identifier as known to the runtime
    pub name: String,

    /// Base URL of the generation runtime
    pub endpoint: String,

    /// Context window of the model, in tokens
    pub context_window: usize,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    server: Option<ServerSection>,
    auth: Option<AuthSection>,
    model: Option<ModelSection>,
    retrieval: Option<RetrievalSection>,
    generation: Option<GenerationSection>,
    rate_limit: Option<RateLimitSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerSection {
    bind: Option<String>,
    body_limit_bytes: Option<usize>,
    allow_cors: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthSection {
    service_key: Option<String>,
    require_api_key: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelSection {
    enabled: Option<bool>,
    name: Option<String>,
    endpoint: Option<String>,
    context_window: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RetrievalSection {
    data_dir: Option<String>,
    knowledge_source: Option<String>,
    default_top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationSection {
    timeout_secs: Option<u64>,
    max_input_tokens: Option<usize>,
    max_output_tokens: Option<u32>,
    default_max_tokens: Option<u32>,
    tokenizer_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateLimitSection {
    limit: Option<u32>,
    window_secs: Option<u64>,
    redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            service_key: None,
            require_api_key: true,
            model: ModelConfig {
                enabled: true,
                name: "qwen2.5:1.5b-instruct".to_string(),
                endpoint: "http://127.0.0.1:11434".to_string(),
                context_window: 1024,
            },
            data_dir: PathBuf::from("data"),
            knowledge_source: None,
            tokenizer_path: None,
            redis_url: None,
            gen_timeout_secs: 50,
            rate_limit: 20,
            rate_window_secs: 60,
            max_input_tokens: 800,
            max_output_tokens: 256,
            default_max_tokens: 128,
            default_top_k: 3,
            body_limit_bytes: 50 * 1024,
            allow_cors: false,
            log_level: None,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional YAML file, and the
    /// environment.
    ///
    /// The config file path is taken from the argument, then from
    /// `WAYPOST_CONFIG`, then `waypost.yaml` in the working directory if one
    /// exists. Environment variables override file values:
    /// - `WAYPOST_BIND`: HTTP listen address
    /// - `WAYPOST_SERVICE_KEY`: shared API secret
    /// - `WAYPOST_REQUIRE_API_KEY`: enforce the key on /generate
    /// - `WAYPOST_MODEL_ENABLED`, `WAYPOST_MODEL_NAME`, `WAYPOST_MODEL_ENDPOINT`,
    ///   `WAYPOST_CONTEXT_WINDOW`: generation runtime settings
    /// - `WAYPOST_DATA_DIR`, `WAYPOST_KNOWLEDGE_SOURCE`: index locations
    /// - `WAYPOST_TOKENIZER_PATH`: HF tokenizer file
    /// - `WAYPOST_REDIS_URL`: distributed rate limiter backend
    /// - `WAYPOST_GEN_TIMEOUT_SECS`, `WAYPOST_MAX_INPUT_TOKENS`,
    ///   `WAYPOST_MAX_OUTPUT_TOKENS`: generation limits
    /// - `WAYPOST_RATE_LIMIT`, `WAYPOST_RATE_WINDOW_SECS`: rate limiting
    /// - `WAYPOST_ALLOW_CORS`: attach a permissive CORS layer
    /// - `RUST_LOG`: log level
    /// - `NO_COLOR`: disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use waypost_core::config::AppConfig;
    ///
    /// let config = AppConfig::load(None).expect("Failed to load config");
    /// println!("Listening on {}", config.bind);
    /// ```
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        let mut config = Self::default();

        // Resolve the config file path
        let config_path = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => match std::env::var("WAYPOST_CONFIG") {
                Ok(path) => Some(PathBuf::from(path)),
                Err(_) => {
                    let default_path = PathBuf::from("waypost.yaml");
                    default_path.exists().then_some(default_path)
                }
            },
        };

        // Load from YAML config file if it exists
        if let Some(ref path) = config_path {
            if !path.exists() {
                return Err(AppError::Config(format!(
                    "Config file does not exist: {:?}",
                    path
                )));
            }
            config = config.merge_yaml(path)?;
        }

        // Environment variables override YAML config
        if let Ok(bind) = std::env::var("WAYPOST_BIND") {
            config.bind = bind;
        }

        if let Ok(key) = std::env::var("WAYPOST_SERVICE_KEY") {
            config.service_key = Some(key);
        }

        if let Some(flag) = env_flag("WAYPOST_REQUIRE_API_KEY") {
            config.require_api_key = flag;
        }

        if let Some(flag) = env_flag("WAYPOST_MODEL_ENABLED") {
            config.model.enabled = flag;
        }

        if let Ok(name) = std::env::var("WAYPOST_MODEL_NAME") {
            config.model.name = name;
        }

        if let Ok(endpoint) = std::env::var("WAYPOST_MODEL_ENDPOINT") {
            config.model.endpoint = endpoint;
        }

        if let Some(window) = env_parse::<usize>("WAYPOST_CONTEXT_WINDOW")? {
            config.model.context_window = window;
        }

        if let Ok(dir) = std::env::var("WAYPOST_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(source) = std::env::var("WAYPOST_KNOWLEDGE_SOURCE") {
            config.knowledge_source = Some(PathBuf::from(source));
        }

        if let Ok(path) = std::env::var("WAYPOST_TOKENIZER_PATH") {
            config.tokenizer_path = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("WAYPOST_REDIS_URL") {
            config.redis_url = Some(url);
        }

        if let Some(secs) = env_parse::<u64>("WAYPOST_GEN_TIMEOUT_SECS")? {
            config.gen_timeout_secs = secs;
        }

        if let Some(limit) = env_parse::<u32>("WAYPOST_RATE_LIMIT")? {
            config.rate_limit = limit;
        }

        if let Some(secs) = env_parse::<u64>("WAYPOST_RATE_WINDOW_SECS")? {
            config.rate_window_secs = secs;
        }

        if let Some(tokens) = env_parse::<usize>("WAYPOST_MAX_INPUT_TOKENS")? {
            config.max_input_tokens = tokens;
        }

        if let Some(tokens) = env_parse::<u32>("WAYPOST_MAX_OUTPUT_TOKENS")? {
            config.max_output_tokens = tokens;
        }

        if let Some(flag) = env_flag("WAYPOST_ALLOW_CORS") {
            config.allow_cors = flag;
        }

        config.log_level = std::env::var("RUST_LOG").ok();

        // Check for NO_COLOR environment variable
        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(server) = config_file.server {
            if let Some(bind) = server.bind {
                result.bind = bind;
            }
            if let Some(limit) = server.body_limit_bytes {
                result.body_limit_bytes = limit;
            }
            if let Some(cors) = server.allow_cors {
                result.allow_cors = cors;
            }
        }

        if let Some(auth) = config_file.auth {
            if let Some(key) = auth.service_key {
                result.service_key = Some(key);
            }
            if let Some(required) = auth.require_api_key {
                result.require_api_key = required;
            }
        }

        if let Some(model) = config_file.model {
            if let Some(enabled) = model.enabled {
                result.model.enabled = enabled;
            }
            if let Some(name) = model.name {
                result.model.name = name;
            }
            if let Some(endpoint) = model.endpoint {
                result.model.endpoint = endpoint;
            }
            if let Some(window) = model.context_window {
                result.model.context_window = window;
            }
        }

        if let Some(retrieval) = config_file.retrieval {
            if let Some(dir) = retrieval.data_dir {
                result.data_dir = PathBuf::from(dir);
            }
            if let Some(source) = retrieval.knowledge_source {
                result.knowledge_source = Some(PathBuf::from(source));
            }
            if let Some(top_k) = retrieval.default_top_k {
                result.default_top_k = top_k;
            }
        }

        if let Some(generation) = config_file.generation {
            if let Some(secs) = generation.timeout_secs {
                result.gen_timeout_secs = secs;
            }
            if let Some(tokens) = generation.max_input_tokens {
                result.max_input_tokens = tokens;
            }
            if let Some(tokens) = generation.max_output_tokens {
                result.max_output_tokens = tokens;
            }
            if let Some(tokens) = generation.default_max_tokens {
                result.default_max_tokens = tokens;
            }
            if let Some(path) = generation.tokenizer_path {
                result.tokenizer_path = Some(PathBuf::from(path));
            }
        }

        if let Some(rate) = config_file.rate_limit {
            if let Some(limit) = rate.limit {
                result.rate_limit = limit;
            }
            if let Some(secs) = rate.window_secs {
                result.rate_window_secs = secs;
            }
            if let Some(url) = rate.redis_url {
                result.redis_url = Some(url);
            }
        }

        // Merge logging settings
        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and file values.
    pub fn with_overrides(
        mut self,
        bind: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(bind) = bind {
            self.bind = bind;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Wall-clock deadline for a single generation call.
    pub fn generation_deadline(&self) -> Duration {
        Duration::from_secs(self.gen_timeout_secs)
    }

    /// Length of the rate-limit window.
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AppResult<()> {
        if self.require_api_key {
            match self.service_key {
                Some(ref key) if key.len() >= MIN_SERVICE_KEY_LEN => {}
                Some(_) => {
                    return Err(AppError::Config(format!(
                        "Service key must be at least {} characters",
                        MIN_SERVICE_KEY_LEN
                    )));
                }
                None => {
                    return Err(AppError::Config(
                        "WAYPOST_SERVICE_KEY is required when require_api_key is set".to_string(),
                    ));
                }
            }
        }

        if self.rate_limit == 0 {
            return Err(AppError::Config(
                "rate_limit must be at least 1".to_string(),
            ));
        }

        if self.rate_window_secs == 0 {
            return Err(AppError::Config(
                "rate_window_secs must be at least 1".to_string(),
            ));
        }

        if self.gen_timeout_secs == 0 {
            return Err(AppError::Config(
                "gen_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.max_input_tokens == 0 || self.model.context_window == 0 {
            return Err(AppError::Config(
                "token limits must be at least 1".to_string(),
            ));
        }

        if self.max_output_tokens == 0 || self.default_max_tokens == 0 {
            return Err(AppError::Config(
                "output token limits must be at least 1".to_string(),
            ));
        }

        if self.default_top_k == 0 {
            return Err(AppError::Config(
                "default_top_k must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a boolean environment flag the way the deployment scripts write them.
fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Parse a numeric environment variable, erroring on malformed values.
fn env_parse<T: std::str::FromStr>(name: &str) -> AppResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
