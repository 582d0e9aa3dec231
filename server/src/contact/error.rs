//! Contact endpoint error responses.

use axum::extract::rejection::JsonRejection;
use axum::http::header::{HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use validator::ValidationErrors;

use crate::ratelimit::RateLimitResult;

/// Reasons a contact submission is refused.
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("{0}")]
    Validation(String),

    /// Either the sender email or the client IP is over its limit.
    #[error("rate limited")]
    RateLimited {
        result: RateLimitResult,
        retry_after: u64,
    },

    #[error("email delivery is not configured")]
    MailerNotConfigured,

    #[error("email delivery failed: {0:#}")]
    Delivery(anyhow::Error),
}

impl From<ValidationErrors> for ContactError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map_or_else(|| format!("{field} is invalid"), |m| m.to_string())
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages.join("; "))
    }
}

impl From<JsonRejection> for ContactError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

/// JSON body for a rate limited submission.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedBody {
    error: &'static str,
    message: String,
    retry_after: u64,
    reset_time: chrono::DateTime<chrono::Utc>,
    remaining: u32,
}

impl IntoResponse for ContactError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "validation", "message": message })),
            )
                .into_response(),
            Self::RateLimited {
                result,
                retry_after,
            } => {
                let body = RateLimitedBody {
                    error: "rate_limited",
                    message: result
                        .reason
                        .unwrap_or_else(|| "Too many messages. Try again later.".to_string()),
                    retry_after,
                    reset_time: result.reset_time,
                    remaining: result.remaining,
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
                    response.headers_mut().insert(RETRY_AFTER, v);
                }
                response
            }
            Self::MailerNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "service_unavailable",
                    "message": "The contact form is temporarily unavailable."
                })),
            )
                .into_response(),
            Self::Delivery(e) => {
                tracing::error!(error = %format!("{e:#}"), "Contact email delivery failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "error": "delivery_failed",
                        "message": "Failed to send message. Please try again later."
                    })),
                )
                    .into_response()
            }
        }
    }
}
