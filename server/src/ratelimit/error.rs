//! Attempt store error types.

/// Errors raised by an [`AttemptStore`](crate::ratelimit::AttemptStore).
///
/// The limiter converts these into fail-open results at its boundary; only
/// the diagnostic `stats` path lets them escape.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis is unreachable or rejected the command.
    #[error("redis unavailable: {0}")]
    Redis(#[from] fred::error::Error),

    /// A stored value could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The backing store is unavailable for another reason.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
