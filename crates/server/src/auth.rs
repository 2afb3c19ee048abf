//! API key checks for the generate and admin routes.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use waypost_core::config::MIN_SERVICE_KEY_LEN;
use waypost_core::{AppError, AppResult};

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Validate the x-api-key header against the configured secret.
///
/// No configured secret means insecure mode: every request is admitted
/// with a warning. With a secret configured, a missing header is 401 and
/// a short or mismatched key is 403. The provided key never appears in
/// log output.
pub fn check_api_key(headers: &HeaderMap, expected: Option<&str>) -> AppResult<()> {
    let Some(expected) = expected.filter(|key| !key.is_empty()) else {
        tracing::warn!("Service running without an API key configured; this is insecure");
        return Ok(());
    };

    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    let Some(provided) = provided else {
        tracing::warn!("Missing x-api-key header");
        return Err(AppError::AuthMissing);
    };

    if provided.len() < MIN_SERVICE_KEY_LEN {
        tracing::warn!("x-api-key header too short or malformed");
        return Err(AppError::AuthInvalid);
    }

    if provided != expected {
        tracing::warn!("Invalid x-api-key header provided");
        return Err(AppError::AuthInvalid);
    }

    Ok(())
}

/// Middleware guarding every non-read route.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    check_api_key(request.headers(), state.config.service_key.as_deref())
        .map_err(|e| state.reject(e))?;
    Ok(next.run(request).await)
}
