//! Background cleanup of idle rate limit records.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::ratelimit::RateLimiter;

/// Start the periodic cleanup task.
///
/// The first tick is consumed immediately so no sweep runs during startup.
/// The task runs until aborted; `main` aborts it during shutdown.
pub fn spawn_cleanup_task(limiter: RateLimiter, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // consume immediate first tick
        loop {
            interval.tick().await;
            let removed = limiter.cleanup().await;
            tracing::debug!(removed, "Rate limit sweep finished");
        }
    })
}
