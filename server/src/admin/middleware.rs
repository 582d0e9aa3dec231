//! Admin authentication middleware.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use super::types::AdminError;
use crate::api::AppState;

/// Middleware that requires `Authorization: Bearer <ADMIN_TOKEN>`.
#[tracing::instrument(skip_all)]
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AdminError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .ok_or(AdminError::Unauthorized)?;

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AdminError::Unauthorized)?;

    if !tokens_match(provided.trim(), expected) {
        tracing::warn!("Rejected admin request with invalid token");
        return Err(AdminError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Compares tokens without short-circuiting on the first differing byte.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
