//! Admin Handlers

use axum::extract::{Path, State};
use axum::Json;

use super::types::{AdminError, RateLimitStatsResponse};
use crate::api::AppState;
use crate::ratelimit::IdentifierKind;

/// Rate limit stats for one identifier.
///
/// GET /api/admin/rate-limits/{type}/{identifier}
#[tracing::instrument(skip(state))]
pub async fn rate_limit_stats(
    State(state): State<AppState>,
    Path((kind, identifier)): Path<(String, String)>,
) -> Result<Json<RateLimitStatsResponse>, AdminError> {
    let kind: IdentifierKind = kind.parse().map_err(AdminError::Validation)?;
    let identifier = identifier.trim().to_lowercase();
    if identifier.is_empty() {
        return Err(AdminError::Validation("identifier must not be empty".into()));
    }

    let stats = state.rate_limiter.stats(&identifier, kind).await?;

    Ok(Json(RateLimitStatsResponse {
        identifier,
        kind,
        stats,
    }))
}
