//! HTTP error mapping.
//!
//! Converts `AppError` values into status codes plus a `{"detail": ...}`
//! JSON body. Anything that can reach a client goes through secret
//! redaction first.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use waypost_core::{redact_secret, AppError};

/// A client-visible failure: status code plus a short detail string.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// A 500 with a fixed detail string; the real cause stays in the logs.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    /// Map a service error onto its HTTP status.
    ///
    /// Expected conditions keep their dedicated codes; everything else
    /// collapses to a 500. The configured secret is scrubbed from the
    /// detail text before it can leave the process.
    pub fn from_app(err: &AppError, secret: Option<&str>) -> Self {
        let status = match err {
            AppError::AuthMissing => StatusCode::UNAUTHORIZED,
            AppError::AuthInvalid => StatusCode::FORBIDDEN,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::PromptTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: redact_secret(&err.to_string(), secret),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::AuthMissing, StatusCode::UNAUTHORIZED),
            (AppError::AuthInvalid, StatusCode::FORBIDDEN),
            (AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                AppError::PromptTooLarge("Prompt too large".to_string()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                AppError::GenerationTimeout(50),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                AppError::SourceNotFound("data/knowledge_pack.json".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Other("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from_app(&err, None).status(), expected, "{err}");
        }
    }

    #[test]
    fn test_detail_carries_display_text() {
        let err = ApiError::from_app(&AppError::RateLimited, None);
        assert_eq!(err.detail(), "Rate limit exceeded");
    }

    #[test]
    fn test_secret_redacted_from_detail() {
        let secret = "sk-0123456789abcdef0123456789abcdef";
        let err = AppError::Other(format!("upstream rejected key {secret}"));
        let api = ApiError::from_app(&err, Some(secret));
        assert!(!api.detail().contains(secret));
        assert!(api.detail().contains("***REDACTED***"));
    }

    #[test]
    fn test_internal_is_500() {
        let err = ApiError::internal("Reload index failed");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail(), "Reload index failed");
    }
}
