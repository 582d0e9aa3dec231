//! Contact Form
//!
//! Validates visitor messages, enforces the per-email and per-IP rate limits,
//! and hands delivery to the configured [`Mailer`](crate::email::Mailer).

pub mod error;
pub mod handlers;
pub mod types;

use axum::{routing::post, Router};

use crate::api::AppState;

pub use error::ContactError;
pub use types::{ContactForm, ContactResponse};

/// Contact routes, mounted under `/api`.
pub fn router() -> Router<AppState> {
    Router::new().route("/contact", post(handlers::submit))
}
