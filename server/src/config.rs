//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::{Context, Result};
use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// Redis connection URL (optional; rate limits fall back to process memory)
    pub redis_url: Option<String>,

    /// SMTP relay host
    pub smtp_host: Option<String>,

    /// SMTP port (default: 587)
    pub smtp_port: u16,

    /// SMTP username
    pub smtp_username: Option<String>,

    /// SMTP password
    pub smtp_password: Option<String>,

    /// Sender address for outgoing mail
    pub smtp_from: Option<String>,

    /// SMTP transport security: "starttls" (default), "tls" or "none"
    pub smtp_tls: String,

    /// Mailbox that receives contact messages (default: `smtp_from`)
    pub contact_to: Option<String>,

    /// Bearer token for the admin stats endpoint (optional; endpoint disabled when unset)
    pub admin_token: Option<String>,

    /// Allowed CORS origin for the portfolio front end (optional)
    pub cors_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let smtp_port = match env::var("SMTP_PORT") {
            Ok(v) => v
                .trim()
                .parse()
                .with_context(|| format!("SMTP_PORT is not a valid port: {v}"))?,
            Err(_) => 587,
        };

        let smtp_from = non_empty("SMTP_FROM");

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            redis_url: non_empty("REDIS_URL"),
            smtp_host: non_empty("SMTP_HOST"),
            smtp_port,
            smtp_username: non_empty("SMTP_USERNAME"),
            smtp_password: non_empty("SMTP_PASSWORD"),
            contact_to: non_empty("CONTACT_TO").or_else(|| smtp_from.clone()),
            smtp_from,
            smtp_tls: env::var("SMTP_TLS").unwrap_or_else(|_| "starttls".into()),
            admin_token: non_empty("ADMIN_TOKEN"),
            cors_origin: non_empty("CORS_ORIGIN"),
        })
    }

    /// Check if SMTP is fully configured.
    #[must_use]
    pub const fn has_smtp(&self) -> bool {
        self.smtp_host.is_some()
            && self.smtp_username.is_some()
            && self.smtp_password.is_some()
            && self.smtp_from.is_some()
    }

    /// Create a default configuration for testing.
    ///
    /// Redis tests expect a local instance:
    /// `docker run -d --name folio-test-redis -p 6380:6379 redis:7`
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            redis_url: Some("redis://localhost:6380".into()),
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
            smtp_tls: "starttls".into(),
            contact_to: None,
            admin_token: None,
            cors_origin: None,
        }
    }
}

/// Reads an environment variable, treating empty values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
