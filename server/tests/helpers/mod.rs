//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full axum router
//! backed by the in-memory attempt store, a manual clock and a recording mailer.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;

use folio_server::api::{create_router, AppState};
use folio_server::config::Config;
use folio_server::email::{ContactMessage, Mailer};
use folio_server::ratelimit::{ManualClock, MemoryAttemptStore, RateLimitConfig, RateLimiter};

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Mailer that keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<ContactMessage>>,
}

impl RecordingMailer {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_contact(&self, message: &ContactMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Mailer whose relay always rejects the message.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send_contact(&self, _message: &ContactMessage) -> anyhow::Result<()> {
        anyhow::bail!("relay refused connection")
    }
}

/// Full router plus handles on its clock, store and mailer.
pub struct TestApp {
    pub router: Router,
    pub clock: ManualClock,
    pub store: Arc<MemoryAttemptStore>,
    pub limiter: RateLimiter,
}

impl TestApp {
    /// Router with default limits, a recording mailer and an admin token.
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self::with_limits(mailer, RateLimitConfig::default())
    }

    pub fn with_limits(mailer: Arc<dyn Mailer>, rl_config: RateLimitConfig) -> Self {
        let mut config = Config::default_for_test();
        config.redis_url = None;
        config.admin_token = Some(ADMIN_TOKEN.into());

        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemoryAttemptStore::new());
        let limiter = RateLimiter::with_clock(store.clone(), rl_config, Arc::new(clock.clone()));

        let state = AppState::new(config, limiter.clone(), Some(mailer));
        Self {
            router: create_router(state),
            clock,
            store,
            limiter,
        }
    }

    /// Router built from an explicit state, for configurations `new` does not cover.
    pub fn from_state(state: AppState, clock: ManualClock, store: Arc<MemoryAttemptStore>) -> Self {
        let limiter = state.rate_limiter.clone();
        Self {
            router: create_router(state),
            clock,
            store,
            limiter,
        }
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// POST a contact form as JSON.
    pub async fn submit(&self, name: &str, email: &str, message: &str) -> Response<Body> {
        let body = serde_json::json!({ "name": name, "email": email, "message": message });
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/contact")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.oneshot(req).await
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}
