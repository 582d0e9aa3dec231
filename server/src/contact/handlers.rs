//! Contact form handler.

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{Extensions, HeaderMap};
use axum::Json;
use tracing::info;
use validator::Validate;

use crate::api::AppState;
use crate::contact::{ContactError, ContactForm, ContactResponse};
use crate::email::ContactMessage;
use crate::ratelimit::{client_ip_identifier, IdentifierKind};

/// Accepts a contact form submission and emails it to the site owner.
///
/// Both the sender email and the client IP must be under their limits. The
/// two checks run concurrently and neither consumes a slot; once delivery has
/// been attempted, one attempt is recorded against each identifier whether
/// it succeeded or not.
///
/// POST /api/contact
#[tracing::instrument(skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    payload: Result<Json<ContactForm>, JsonRejection>,
) -> Result<Json<ContactResponse>, ContactError> {
    let Json(form) = payload?;
    let form = form.trimmed();
    form.validate()?;

    let Some(mailer) = state.mailer.clone() else {
        return Err(ContactError::MailerNotConfigured);
    };

    let limiter = &state.rate_limiter;
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip_identifier(&headers, peer, limiter.config().trust_proxy);

    let (by_email, by_ip) = tokio::join!(
        limiter.check(&form.email, IdentifierKind::Email),
        limiter.check(&ip, IdentifierKind::Ip),
    );
    for result in [by_email, by_ip] {
        if !result.allowed {
            let retry_after = result.retry_after_secs(limiter.now());
            return Err(ContactError::RateLimited {
                result,
                retry_after,
            });
        }
    }

    let message = ContactMessage::from(form);
    let outcome = mailer.send_contact(&message).await;
    let success = outcome.is_ok();

    tokio::join!(
        limiter.record_attempt(&message.email, IdentifierKind::Email, success),
        limiter.record_attempt(&ip, IdentifierKind::Ip, success),
    );

    outcome.map_err(ContactError::Delivery)?;

    info!(ip = %ip, "Contact message delivered");
    Ok(Json(ContactResponse {
        success: true,
        message: "Email sent successfully",
    }))
}
