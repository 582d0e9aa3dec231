//! Time source for the limiter.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
///
/// Clones share the same time value, so advancing one advances all.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
