//! Admin module types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ratelimit::{IdentifierKind, RateLimitStats, StoreError};

/// Stats for one identifier, as returned by the admin endpoint.
#[derive(Debug, Serialize)]
pub struct RateLimitStatsResponse {
    pub identifier: String,
    #[serde(rename = "type")]
    pub kind: IdentifierKind,
    #[serde(flatten)]
    pub stats: RateLimitStats,
}

/// Admin API error type.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Missing or wrong bearer token.
    #[error("Admin token required")]
    Unauthorized,

    /// Validation error.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Rate limit store could not be read.
    #[error("Rate limit store error")]
    Store(#[from] StoreError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, serde_json::json!({"error": "unauthorized", "message": "Admin token required"})),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": "validation", "message": msg})),
            Self::Store(e) => {
                tracing::error!(error = %e, "Rate limit stats lookup failed");
                (StatusCode::SERVICE_UNAVAILABLE, serde_json::json!({"error": "store_unavailable", "message": "Rate limit store is unavailable"}))
            }
        };
        (status, Json(body)).into_response()
    }
}
