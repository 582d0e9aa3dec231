//! Folio Server - Main Entry Point
//!
//! Contact form backend with rate limiting.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use folio_server::email::{EmailService, Mailer};
use folio_server::ratelimit::{
    spawn_cleanup_task, AttemptStore, MemoryAttemptStore, RateLimitConfig, RateLimiter,
    RedisAttemptStore,
};
use folio_server::{api, config};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;
    let rl_config = RateLimitConfig::from_env();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Folio Server"
    );

    // Initialize rate limit store (Redis when configured, memory otherwise)
    let store: Arc<dyn AttemptStore> = match config.redis_url.as_deref() {
        Some(url) => match connect_redis_store(url, &rl_config).await {
            Ok(store) => {
                info!(prefix = %rl_config.key_prefix, "Rate limit store connected to Redis");
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    error = %format!("{e:#}"),
                    "Redis rate limit store unavailable. Falling back to in-memory store."
                );
                Arc::new(MemoryAttemptStore::new())
            }
        },
        None => {
            warn!("REDIS_URL not set. Rate limits are kept in memory and reset on restart.");
            Arc::new(MemoryAttemptStore::new())
        }
    };

    let cleanup_every = Duration::from_secs(rl_config.cleanup_interval_secs);
    let rate_limiter = RateLimiter::new(store, rl_config);
    let sweeper = spawn_cleanup_task(rate_limiter.clone(), cleanup_every);

    // Initialize email service (optional - contact form answers 503 without it)
    let mailer: Option<Arc<dyn Mailer>> = if config.has_smtp() {
        match EmailService::new(&config) {
            Ok(service) => {
                if let Err(e) = service.test_connection().await {
                    warn!(error = %format!("{e:#}"), "SMTP connection test failed. Sending will be retried per message.");
                }
                info!("Email service initialized");
                Some(Arc::new(service))
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Email service initialization failed. Contact form disabled.");
                None
            }
        }
    } else {
        warn!("SMTP not configured. Contact form disabled.");
        None
    };

    // Build application state
    let state = api::AppState::new(config.clone(), rate_limiter, mailer);

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for CTRL+C, shutting down");
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Connects to Redis and loads the rate limit scripts.
async fn connect_redis_store(
    url: &str,
    rl_config: &RateLimitConfig,
) -> Result<RedisAttemptStore> {
    use fred::prelude::*;

    let redis_config = Config::from_url(url).context("Invalid REDIS_URL")?;
    let client = Client::new(redis_config, None, None, None);
    client.connect();
    tokio::time::timeout(REDIS_CONNECT_TIMEOUT, client.wait_for_connect())
        .await
        .context("Timed out connecting to Redis")?
        .context("Failed to connect to Redis")?;

    let store = RedisAttemptStore::new(client, rl_config);
    store.init().await.context("Failed to load rate limit scripts")?;
    Ok(store)
}
