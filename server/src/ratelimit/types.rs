//! Rate limiting types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an identifier names: a sender email address or a client IP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Sender email address from the contact form
    Email,
    /// Normalized client IP address
    Ip,
}

impl IdentifierKind {
    /// Returns the string identifier for this kind (used in store keys).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Ip => "ip",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "ip" => Ok(Self::Ip),
            other => Err(format!("unknown identifier kind: {other}")),
        }
    }
}

/// Lookup key for a rate limit record.
///
/// The identifier is lower-cased on construction so that `User@Example.com`
/// and `user@example.com` address the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    identifier: String,
    kind: IdentifierKind,
}

impl RecordKey {
    pub fn new(identifier: &str, kind: IdentifierKind) -> Self {
        Self {
            identifier: identifier.to_lowercase(),
            kind,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub const fn kind(&self) -> IdentifierKind {
        self.kind
    }
}

/// One recorded contact attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// Stored attempt history for one (identifier, kind) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    /// Lower-cased identifier
    pub identifier: String,
    #[serde(rename = "type")]
    pub kind: IdentifierKind,
    /// Attempts ordered by timestamp; may still hold entries awaiting pruning
    pub attempts: Vec<Attempt>,
    /// Every attempt ever appended to this record
    pub total_recorded: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RateLimitRecord {
    /// Creates an empty record, as an upsert would.
    pub fn empty(key: &RecordKey, now: DateTime<Utc>) -> Self {
        Self {
            identifier: key.identifier().to_string(),
            kind: key.kind(),
            attempts: Vec::new(),
            total_recorded: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attempts strictly newer than `window_start`.
    pub fn attempts_since(&self, window_start: DateTime<Utc>) -> impl Iterator<Item = &Attempt> {
        self.attempts
            .iter()
            .filter(move |a| a.timestamp > window_start)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// Whether a new attempt is permitted
    pub allowed: bool,
    /// Attempts left after the caller's pending one (0 when denied)
    pub remaining: u32,
    /// When the window next has room (denied) or when a fresh window would end (allowed)
    pub reset_time: DateTime<Utc>,
    /// Attempts counted inside the current window
    pub total_attempts: u32,
    /// Human-readable denial message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RateLimitResult {
    /// Seconds until `reset_time`, rounded up, never negative.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let ms = u64::try_from((self.reset_time - now).num_milliseconds()).unwrap_or(0);
        ms.div_ceil(1000)
    }
}

/// Diagnostic view of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    /// Attempts ever recorded for the identifier
    pub total_attempts: u64,
    /// Successful attempts inside the current window
    pub successful_attempts: u32,
    /// All attempts inside the current window
    pub recent_attempts: u32,
    /// Earliest time the window admits a new attempt
    pub next_reset_time: DateTime<Utc>,
}
