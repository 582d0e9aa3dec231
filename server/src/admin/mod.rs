//! Admin API
//!
//! Read-only diagnostics behind the `ADMIN_TOKEN` bearer token.

pub mod handlers;
pub mod middleware;
pub mod types;

use axum::{middleware::from_fn_with_state, routing::get, Router};

use crate::api::AppState;

pub use middleware::require_admin_token;
pub use types::AdminError;

/// Admin routes, mounted under `/api/admin`.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/rate-limits/{kind}/{identifier}",
            get(handlers::rate_limit_stats),
        )
        .layer(from_fn_with_state(state, require_admin_token))
}
