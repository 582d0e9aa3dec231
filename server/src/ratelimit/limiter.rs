//! Sliding-window rate limiter for contact attempts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::ratelimit::{
    Attempt, AttemptStore, Clock, IdentifierKind, RateLimitConfig, RateLimitResult,
    RateLimitStats, RecordKey, StoreError, SystemClock,
};

/// Sliding-window rate limiter over an [`AttemptStore`].
///
/// Holds no mutable state of its own: every decision is derived from the
/// store, so clones and separate instances sharing one store agree on counts.
/// `check` and `record_attempt` never fail; store errors are logged and
/// turned into fail-open results.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    config: Arc<RateLimitConfig>,
}

impl RateLimiter {
    /// Creates a limiter using the system clock.
    pub fn new(store: Arc<dyn AttemptStore>, config: RateLimitConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn AttemptStore>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            config: Arc::new(config),
        }
    }

    /// Returns the configuration for this rate limiter.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Current time according to the limiter's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Decides whether a new attempt for `identifier` is allowed.
    ///
    /// Does not consume a slot; call [`record_attempt`](Self::record_attempt)
    /// once the attempt has actually been made. If the store is unreachable
    /// the result is allowed with `total_attempts: 0`.
    #[tracing::instrument(skip(self), fields(kind = %kind))]
    pub async fn check(&self, identifier: &str, kind: IdentifierKind) -> RateLimitResult {
        let now = self.clock.now();
        let window = self.config.window();
        let limit = self.config.limit_for(kind);
        let key = RecordKey::new(identifier, kind);

        let recent = match self.recent_timestamps(&key, now - window, now).await {
            Ok(recent) => recent,
            Err(e) => {
                warn!(
                    error = %e,
                    identifier = %key.identifier(),
                    "Rate limit store unavailable, allowing request (fail open)"
                );
                return RateLimitResult {
                    allowed: true,
                    remaining: limit.saturating_sub(1),
                    reset_time: now + window,
                    total_attempts: 0,
                    reason: None,
                };
            }
        };

        let count = u32::try_from(recent.len()).unwrap_or(u32::MAX);

        if count >= limit {
            // Room opens when the oldest counted attempt leaves the window.
            let reset_time = recent.iter().min().map_or(now, |oldest| *oldest + window);
            debug!(
                identifier = %key.identifier(),
                count,
                limit,
                reset_time = %reset_time,
                "Rate limit exceeded"
            );
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_time,
                total_attempts: count,
                reason: Some(format!(
                    "Rate limit exceeded for {kind}. Try again after {}",
                    reset_time.format("%Y-%m-%d %H:%M:%S UTC")
                )),
            };
        }

        RateLimitResult {
            allowed: true,
            remaining: limit - count - 1,
            reset_time: now + window,
            total_attempts: count,
            reason: None,
        }
    }

    /// Prunes the record, then re-reads and re-filters it.
    ///
    /// The re-filter covers a concurrent writer landing between prune and read.
    async fn recent_timestamps(
        &self,
        key: &RecordKey,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        self.store.prune(key, window_start, now).await?;
        let record = self.store.find(key).await?;
        Ok(record
            .map(|r| r.attempts_since(window_start).map(|a| a.timestamp).collect())
            .unwrap_or_default())
    }

    /// Records one real attempt, successful or not.
    ///
    /// Uses the store's atomic prune-and-append, falling back to a separate
    /// prune followed by a push. Failures are logged and never returned: by
    /// the time this runs the email has already been sent or rejected.
    #[tracing::instrument(skip(self), fields(kind = %kind))]
    pub async fn record_attempt(&self, identifier: &str, kind: IdentifierKind, success: bool) {
        let now = self.clock.now();
        let window_start = now - self.config.window();
        let key = RecordKey::new(identifier, kind);
        let attempt = Attempt {
            timestamp: now,
            success,
        };

        let Err(e) = self.store.append(&key, attempt, window_start).await else {
            return;
        };
        warn!(
            error = %e,
            identifier = %key.identifier(),
            "Atomic append failed, falling back to prune then push"
        );

        let fallback = async {
            self.store.prune(&key, window_start, now).await?;
            self.store.push(&key, attempt).await
        };
        if let Err(e) = fallback.await {
            error!(
                error = %e,
                identifier = %key.identifier(),
                success,
                "Failed to record attempt"
            );
        }
    }

    /// Deletes records idle for longer than the configured TTL.
    ///
    /// Returns the number of records removed, or 0 if the store failed.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup(&self) -> u64 {
        let cutoff = self.clock.now() - self.config.idle_ttl();
        match self.store.delete_idle(cutoff).await {
            Ok(removed) => {
                info!(removed, cutoff = %cutoff, "Rate limit cleanup completed");
                removed
            }
            Err(e) => {
                error!(error = %e, "Rate limit cleanup failed");
                0
            }
        }
    }

    /// Read-only view of an identifier's record for diagnostics.
    ///
    /// Unlike `check`, store errors are returned to the caller.
    #[tracing::instrument(skip(self), fields(kind = %kind))]
    pub async fn stats(
        &self,
        identifier: &str,
        kind: IdentifierKind,
    ) -> Result<RateLimitStats, StoreError> {
        let now = self.clock.now();
        let window = self.config.window();
        let key = RecordKey::new(identifier, kind);

        let Some(record) = self.store.find(&key).await? else {
            return Ok(RateLimitStats {
                total_attempts: 0,
                successful_attempts: 0,
                recent_attempts: 0,
                next_reset_time: now + window,
            });
        };

        let recent: Vec<&Attempt> = record.attempts_since(now - window).collect();
        let successful = recent.iter().filter(|a| a.success).count();
        let next_reset_time = recent
            .iter()
            .map(|a| a.timestamp)
            .min()
            .map_or(now + window, |oldest| oldest + window);

        Ok(RateLimitStats {
            total_attempts: record.total_recorded,
            successful_attempts: u32::try_from(successful).unwrap_or(u32::MAX),
            recent_attempts: u32::try_from(recent.len()).unwrap_or(u32::MAX),
            next_reset_time,
        })
    }
}
