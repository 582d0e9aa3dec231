//! Rate limiting configuration.

use chrono::TimeDelta;

use crate::ratelimit::{
    IdentifierKind, DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_EMAIL_LIMIT, DEFAULT_IP_LIMIT,
    DEFAULT_KEY_PREFIX, DEFAULT_WINDOW_MS, IDLE_TTL_SECS,
};

/// Configuration for the contact-form rate limiter.
///
/// Fixed at construction; the limiter never mutates it.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum attempts per email address per window
    pub email_limit: u32,
    /// Maximum attempts per IP address per window
    pub ip_limit: u32,
    /// Sliding window length in milliseconds
    pub window_ms: u64,
    /// Records untouched for this many seconds are removed by cleanup
    pub idle_ttl_secs: u64,
    /// Prefix for Redis keys (e.g., "folio:rl")
    pub key_prefix: String,
    /// Whether to trust X-Forwarded-For headers
    pub trust_proxy: bool,
    /// Seconds between background cleanup sweeps
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            email_limit: DEFAULT_EMAIL_LIMIT,
            ip_limit: DEFAULT_IP_LIMIT,
            window_ms: DEFAULT_WINDOW_MS,
            idle_ttl_secs: IDLE_TTL_SECS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            trust_proxy: false,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl RateLimitConfig {
    /// Creates configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RATE_LIMIT_EMAIL`: Attempts per email address per window (default: 3)
    /// - `RATE_LIMIT_IP`: Attempts per IP address per window (default: 10)
    /// - `RATE_LIMIT_WINDOW_MS`: Window length in milliseconds (default: 3600000)
    /// - `RATE_LIMIT_IDLE_TTL_SECS`: Idle record expiry in seconds (default: 86400)
    /// - `RATE_LIMIT_PREFIX`: Redis key prefix (default: "folio:rl")
    /// - `RATE_LIMIT_TRUST_PROXY`: Trust X-Forwarded-For headers (default: false)
    /// - `RATE_LIMIT_CLEANUP_INTERVAL_SECS`: Seconds between sweeps (default: 3600)
    ///
    /// Values that fail to parse, and zero limits or intervals, keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_env::<u32>("RATE_LIMIT_EMAIL").filter(|v| *v > 0) {
            config.email_limit = v;
        }
        if let Some(v) = parse_env::<u32>("RATE_LIMIT_IP").filter(|v| *v > 0) {
            config.ip_limit = v;
        }
        if let Some(v) = parse_env::<u64>("RATE_LIMIT_WINDOW_MS").filter(|v| *v > 0) {
            config.window_ms = v;
        }
        if let Some(v) = parse_env("RATE_LIMIT_IDLE_TTL_SECS") {
            config.idle_ttl_secs = v;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_PREFIX") {
            config.key_prefix = val;
        }
        if let Some(v) = parse_env("RATE_LIMIT_TRUST_PROXY") {
            config.trust_proxy = v;
        }
        if let Some(v) = parse_env::<u64>("RATE_LIMIT_CLEANUP_INTERVAL_SECS").filter(|v| *v > 0) {
            config.cleanup_interval_secs = v;
        }

        config
    }

    /// Returns the attempt limit for an identifier kind.
    pub const fn limit_for(&self, kind: IdentifierKind) -> u32 {
        match kind {
            IdentifierKind::Email => self.email_limit,
            IdentifierKind::Ip => self.ip_limit,
        }
    }

    /// Sliding window length.
    pub fn window(&self) -> TimeDelta {
        TimeDelta::milliseconds(i64::try_from(self.window_ms).unwrap_or(i64::MAX))
    }

    /// Idle expiry as a duration.
    pub fn idle_ttl(&self) -> TimeDelta {
        i64::try_from(self.idle_ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}
