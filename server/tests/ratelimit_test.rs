//! Integration tests for the sliding-window rate limiter.
//!
//! Runs against the in-memory attempt store with a manual clock. The Redis
//! store has its own ignored suite in `redis_store_test.rs`.
//!
//! Run with: `cargo test --test ratelimit_test`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use folio_server::ratelimit::{
    Attempt, AttemptStore, Clock, IdentifierKind, ManualClock, MemoryAttemptStore, RateLimitConfig,
    RateLimitRecord, RateLimiter, RecordKey, StoreError,
};

/// Helper to create a limiter over a fresh memory store.
fn create_test_limiter(config: RateLimitConfig) -> (RateLimiter, ManualClock) {
    let clock = ManualClock::new(Utc::now());
    let limiter = RateLimiter::with_clock(
        Arc::new(MemoryAttemptStore::new()),
        config,
        Arc::new(clock.clone()),
    );
    (limiter, clock)
}

/// Store that fails every call, as if Redis were down.
struct FailingStore;

#[async_trait]
impl AttemptStore for FailingStore {
    async fn prune(
        &self,
        _key: &RecordKey,
        _window_start: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn find(&self, _key: &RecordKey) -> Result<Option<RateLimitRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn append(
        &self,
        _key: &RecordKey,
        _attempt: Attempt,
        _window_start: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn push(&self, _key: &RecordKey, _attempt: Attempt) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete_idle(&self, _cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Memory store whose atomic append is unavailable, forcing the two-step path.
#[derive(Default)]
struct NoAtomicAppendStore {
    inner: MemoryAttemptStore,
    append_calls: AtomicUsize,
}

#[async_trait]
impl AttemptStore for NoAtomicAppendStore {
    async fn prune(
        &self,
        key: &RecordKey,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.prune(key, window_start, now).await
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<RateLimitRecord>, StoreError> {
        self.inner.find(key).await
    }

    async fn append(
        &self,
        _key: &RecordKey,
        _attempt: Attempt,
        _window_start: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("scripting disabled".into()))
    }

    async fn push(&self, key: &RecordKey, attempt: Attempt) -> Result<(), StoreError> {
        self.inner.push(key, attempt).await
    }

    async fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_idle(cutoff).await
    }
}

/// Memory store that yields before every operation so concurrent callers interleave.
#[derive(Default)]
struct YieldingStore {
    inner: MemoryAttemptStore,
}

#[async_trait]
impl AttemptStore for YieldingStore {
    async fn prune(
        &self,
        key: &RecordKey,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.prune(key, window_start, now).await
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<RateLimitRecord>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.find(key).await
    }

    async fn append(
        &self,
        key: &RecordKey,
        attempt: Attempt,
        window_start: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.append(key, attempt, window_start).await
    }

    async fn push(&self, key: &RecordKey, attempt: Attempt) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.push(key, attempt).await
    }

    async fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_idle(cutoff).await
    }
}

#[tokio::test]
async fn test_attempts_under_limit_are_allowed() {
    let (limiter, clock) = create_test_limiter(RateLimitConfig::default());

    for i in 0..3 {
        let result = limiter.check("ada@example.com", IdentifierKind::Email).await;
        assert!(result.allowed, "attempt {i} should be allowed");
        assert_eq!(result.total_attempts, i);
        assert_eq!(result.remaining, 2 - i);

        limiter
            .record_attempt("ada@example.com", IdentifierKind::Email, true)
            .await;
        clock.advance(TimeDelta::minutes(5));
    }
}

#[tokio::test]
async fn test_email_scenario_denies_fourth_attempt() {
    let (limiter, _clock) = create_test_limiter(RateLimitConfig::default());

    for _ in 0..3 {
        limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;
    }

    let result = limiter.check("a@b.com", IdentifierKind::Email).await;
    assert!(!result.allowed);
    assert_eq!(result.remaining, 0);
    assert_eq!(result.total_attempts, 3);
    assert!(result.reason.is_some());
}

#[tokio::test]
async fn test_reset_time_is_oldest_attempt_plus_window() {
    let (limiter, clock) = create_test_limiter(RateLimitConfig::default());
    let first = clock.now();

    limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;
    clock.advance(TimeDelta::minutes(10));
    limiter.record_attempt("a@b.com", IdentifierKind::Email, false).await;
    clock.advance(TimeDelta::minutes(10));
    limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;

    let denied = limiter.check("a@b.com", IdentifierKind::Email).await;
    assert!(!denied.allowed);
    assert_eq!(denied.reset_time, first + TimeDelta::hours(1));

    // One millisecond early is still denied
    clock.set(denied.reset_time - TimeDelta::milliseconds(1));
    assert!(!limiter.check("a@b.com", IdentifierKind::Email).await.allowed);

    // Exactly at resetTime the oldest attempt has left the window
    clock.set(denied.reset_time);
    let result = limiter.check("a@b.com", IdentifierKind::Email).await;
    assert!(result.allowed);
    assert_eq!(result.total_attempts, 2);
    assert_eq!(result.remaining, 0);
}

#[tokio::test]
async fn test_expired_attempt_is_not_counted() {
    let config = RateLimitConfig {
        email_limit: 1,
        ..Default::default()
    };
    let (limiter, clock) = create_test_limiter(config);

    limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;
    clock.advance(TimeDelta::hours(1) + TimeDelta::milliseconds(1));

    let result = limiter.check("a@b.com", IdentifierKind::Email).await;
    assert!(result.allowed);
    assert_eq!(result.total_attempts, 0);
}

#[tokio::test]
async fn test_identifiers_are_case_insensitive() {
    let (limiter, _clock) = create_test_limiter(RateLimitConfig::default());

    limiter
        .record_attempt("User@Example.com", IdentifierKind::Email, true)
        .await;

    let result = limiter.check("user@example.com", IdentifierKind::Email).await;
    assert_eq!(result.total_attempts, 1);
}

#[tokio::test]
async fn test_kinds_are_counted_separately() {
    let config = RateLimitConfig {
        email_limit: 1,
        ..Default::default()
    };
    let (limiter, _clock) = create_test_limiter(config);

    limiter.record_attempt("shared", IdentifierKind::Email, true).await;

    assert!(!limiter.check("shared", IdentifierKind::Email).await.allowed);
    let by_ip = limiter.check("shared", IdentifierKind::Ip).await;
    assert!(by_ip.allowed);
    assert_eq!(by_ip.total_attempts, 0);
}

#[tokio::test]
async fn test_record_then_check_sees_new_count() {
    let (limiter, _clock) = create_test_limiter(RateLimitConfig::default());

    for expected in 1..=5 {
        limiter.record_attempt("10.1.2.3", IdentifierKind::Ip, false).await;
        let result = limiter.check("10.1.2.3", IdentifierKind::Ip).await;
        assert_eq!(result.total_attempts, expected);
    }
}

#[tokio::test]
async fn test_failing_store_fails_open() {
    let clock = ManualClock::new(Utc::now());
    let limiter = RateLimiter::with_clock(
        Arc::new(FailingStore),
        RateLimitConfig::default(),
        Arc::new(clock.clone()),
    );

    let result = limiter.check("a@b.com", IdentifierKind::Email).await;
    assert!(result.allowed);
    assert_eq!(result.total_attempts, 0);
    assert_eq!(result.remaining, 2);

    // Neither recording nor cleanup propagates the failure
    limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;
    assert_eq!(limiter.cleanup().await, 0);

    // Stats are diagnostic and do report it
    let err = limiter.stats("a@b.com", IdentifierKind::Email).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[tokio::test]
async fn test_record_falls_back_when_append_fails() {
    let store = Arc::new(NoAtomicAppendStore::default());
    let clock = ManualClock::new(Utc::now());
    let limiter = RateLimiter::with_clock(
        store.clone(),
        RateLimitConfig::default(),
        Arc::new(clock.clone()),
    );

    limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;
    clock.advance(TimeDelta::hours(2));
    limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;

    assert_eq!(store.append_calls.load(Ordering::SeqCst), 2);

    let record = store
        .find(&RecordKey::new("a@b.com", IdentifierKind::Email))
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.attempts.len(), 1, "fallback path still prunes");
    assert_eq!(record.total_recorded, 2);
}

/// Create a limiter over a [`YieldingStore`] for multi-threaded tests.
fn create_yielding_limiter(config: RateLimitConfig) -> RateLimiter {
    RateLimiter::with_clock(
        Arc::new(YieldingStore::default()),
        config,
        Arc::new(ManualClock::new(Utc::now())),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_lose_no_updates() {
    let config = RateLimitConfig {
        ip_limit: 100,
        ..Default::default()
    };
    let limiter = create_yielding_limiter(config);

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .record_attempt("192.0.2.1", IdentifierKind::Ip, i % 2 == 0)
                    .await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = limiter.stats("192.0.2.1", IdentifierKind::Ip).await.unwrap();
    assert_eq!(stats.total_attempts, 50);
    assert_eq!(stats.recent_attempts, 50);
    assert_eq!(stats.successful_attempts, 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_at_limit_are_all_denied() {
    let limiter = create_yielding_limiter(RateLimitConfig::default());
    for _ in 0..3 {
        limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;
    }

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check("a@b.com", IdentifierKind::Email).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(result.total_attempts, 3);
    }
}

/// `check` does not reserve a slot, so tasks racing between check and
/// record can all be admitted. What holds is that every admitted attempt is
/// recorded and the limit applies again once the race is over.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_check_then_record_records_every_admitted_attempt() {
    const TASKS: u32 = 10;
    let limiter = create_yielding_limiter(RateLimitConfig::default());
    let start = Arc::new(tokio::sync::Barrier::new(TASKS as usize));

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let limiter = limiter.clone();
            let start = start.clone();
            tokio::spawn(async move {
                start.wait().await;
                let result = limiter.check("a@b.com", IdentifierKind::Email).await;
                if result.allowed {
                    limiter.record_attempt("a@b.com", IdentifierKind::Email, true).await;
                }
                result.allowed
            })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }

    // Fewer than `limit` admissions would mean every check saw room
    assert!((3..=TASKS).contains(&allowed), "allowed = {allowed}");

    let stats = limiter.stats("a@b.com", IdentifierKind::Email).await.unwrap();
    assert_eq!(stats.total_attempts, u64::from(allowed));
    assert_eq!(stats.recent_attempts, allowed);

    let after = limiter.check("a@b.com", IdentifierKind::Email).await;
    assert!(!after.allowed);
    assert_eq!(after.total_attempts, allowed);
}

#[tokio::test]
async fn test_cleanup_keeps_active_records() {
    let (limiter, clock) = create_test_limiter(RateLimitConfig::default());

    limiter.record_attempt("old@b.com", IdentifierKind::Email, true).await;
    clock.advance(TimeDelta::hours(20));
    limiter.record_attempt("new@b.com", IdentifierKind::Email, true).await;
    clock.advance(TimeDelta::hours(5));

    assert_eq!(limiter.cleanup().await, 1);

    let gone = limiter.stats("old@b.com", IdentifierKind::Email).await.unwrap();
    assert_eq!(gone.total_attempts, 0);
    let kept = limiter.stats("new@b.com", IdentifierKind::Email).await.unwrap();
    assert_eq!(kept.total_attempts, 1);
}
