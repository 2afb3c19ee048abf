//! Error types for the Waypost answering service.
//!
//! This module defines a unified error enum that covers all error categories
//! in the service: configuration, I/O, authentication, rate limiting, prompt
//! sizing, generation, retrieval, and admin rebuild errors.

use thiserror::Error;

/// Unified error type for the Waypost answering service.
///
/// All fallible functions return `Result<T, AppError>`. Expected conditions
/// (timeout, oversized prompt, missing index source) have their own variants
/// so callers can react to them without string matching; `Other` is reserved
/// for truly unexpected faults.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The x-api-key header was not supplied
    #[error("Missing x-api-key header")]
    AuthMissing,

    /// The x-api-key header was supplied but malformed or wrong
    #[error("Invalid API key")]
    AuthInvalid,

    /// Per-client request budget exhausted
    #[error("Rate limit exceeded")]
    RateLimited,

    /// User prompt over the token ceiling or the body byte limit
    #[error("{0}")]
    PromptTooLarge(String),

    /// Generation exceeded its wall-clock deadline
    #[error("Generation timed out after {0} seconds")]
    GenerationTimeout(u64),

    /// Generation runtime errors other than timeout; absorbed into fallback
    #[error("Generation error: {0}")]
    Generation(String),

    /// Retrieval errors; absorbed into an empty retrieval result
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// No document source found when rebuilding the index
    #[error("Document source not found: {0}")]
    SourceNotFound(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

/// Replace any occurrence of the configured service secret in `message`.
///
/// Applied to every message that can reach a client or a log line, so a
/// misbehaving subsystem cannot leak the key through error text.
pub fn redact_secret(message: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() && message.contains(secret) => {
            message.replace(secret, "***REDACTED***")
        }
        _ => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_secret_present() {
        let msg = "request failed with key sk-0123456789abcdef0123456789abcdef";
        let out = redact_secret(msg, Some("sk-0123456789abcdef0123456789abcdef"));
        assert_eq!(out, "request failed with key ***REDACTED***");
    }

    #[test]
    fn test_redact_secret_absent() {
        let msg = "plain failure";
        assert_eq!(redact_secret(msg, Some("sk-key")), msg);
        assert_eq!(redact_secret(msg, None), msg);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(AppError::AuthMissing.to_string(), "Missing x-api-key header");
        assert_eq!(AppError::RateLimited.to_string(), "Rate limit exceeded");
        assert_eq!(
            AppError::GenerationTimeout(50).to_string(),
            "Generation timed out after 50 seconds"
        );
    }
}
