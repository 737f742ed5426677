//! Bearer-token guard for the `/fhir` routes.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

/// Rejects requests whose `Authorization: Bearer <token>` header does not carry the
/// configured API token.
pub async fn require_bearer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    validate_token(provided, state.service.config().api_token())?;
    Ok(next.run(req).await)
}

fn validate_token(provided: &str, expected: &str) -> Result<(), ApiError> {
    if provided.trim() == expected {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid bearer token".into()))
    }
}
