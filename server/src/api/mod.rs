//! API Router and Application State
//!
//! Central routing configuration and shared state.

use axum::{extract::State, http::HeaderValue, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{admin, config::Config, contact, email::Mailer, ratelimit::RateLimiter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Contact form rate limiter
    pub rate_limiter: RateLimiter,
    /// Outgoing mail (optional; the contact form answers 503 without it)
    pub mailer: Option<Arc<dyn Mailer>>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(config: Config, rate_limiter: RateLimiter, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Self {
            config: Arc::new(config),
            rate_limiter,
            mailer,
        }
    }

    /// Check if outgoing mail is configured.
    #[must_use]
    pub fn has_mailer(&self) -> bool {
        self.mailer.is_some()
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());

    let mut api_routes = Router::new()
        .route("/health", get(health_check))
        .merge(contact::router());

    // Admin routes only exist when a token is configured
    if state.config.admin_token.is_some() {
        api_routes = api_routes.nest("/admin", admin::router(state.clone()));
    }

    Router::new()
        .nest("/api", api_routes)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // State
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Invalid CORS_ORIGIN, allowing any origin");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Server time
    timestamp: DateTime<Utc>,
    /// Whether outgoing mail is configured
    email: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        email: state.has_mailer(),
    })
}
