//! Attempt persistence.
//!
//! [`AttemptStore`] is the durable side of the limiter. Every mutating method
//! must be atomic per record: two concurrent prunes or appends on the same
//! key may interleave with each other but never corrupt the attempt list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::ratelimit::{Attempt, RateLimitRecord, RecordKey, StoreError};

/// Durable storage for per-identifier attempt history.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Removes attempts at or before `window_start`, upserting the record if absent.
    async fn prune(
        &self,
        key: &RecordKey,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Loads the record, if one exists.
    async fn find(&self, key: &RecordKey) -> Result<Option<RateLimitRecord>, StoreError>;

    /// Prunes and appends in one atomic operation, upserting the record.
    async fn append(
        &self,
        key: &RecordKey,
        attempt: Attempt,
        window_start: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Appends without pruning, upserting the record.
    ///
    /// Second half of the two-step fallback used when [`append`](Self::append) fails.
    async fn push(&self, key: &RecordKey, attempt: Attempt) -> Result<(), StoreError>;

    /// Deletes records whose `updated_at` is before `cutoff`. Returns how many were removed.
    async fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-process store for single-instance deployments and tests.
///
/// Each record lives behind a `DashMap` shard lock, which gives the
/// per-record atomicity the limiter relies on. Limits do not survive a
/// restart and are not shared between instances.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    records: DashMap<RecordKey, RateLimitRecord>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn push_attempt(record: &mut RateLimitRecord, attempt: Attempt) {
    record.attempts.push(attempt);
    record.total_recorded += 1;
    record.updated_at = attempt.timestamp;
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn prune(
        &self,
        key: &RecordKey,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| RateLimitRecord::empty(key, now));
        record.attempts.retain(|a| a.timestamp > window_start);
        record.updated_at = now;
        Ok(())
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<RateLimitRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn append(
        &self,
        key: &RecordKey,
        attempt: Attempt,
        window_start: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| RateLimitRecord::empty(key, attempt.timestamp));
        record.attempts.retain(|a| a.timestamp > window_start);
        push_attempt(&mut record, attempt);
        Ok(())
    }

    async fn push(&self, key: &RecordKey, attempt: Attempt) -> Result<(), StoreError> {
        let mut record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| RateLimitRecord::empty(key, attempt.timestamp));
        push_attempt(&mut record, attempt);
        Ok(())
    }

    async fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| record.updated_at >= cutoff);
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}
