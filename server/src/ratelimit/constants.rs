//! Rate limiting constants.

/// Default attempts allowed per email address per window.
pub const DEFAULT_EMAIL_LIMIT: u32 = 3;

/// Default attempts allowed per IP address per window.
pub const DEFAULT_IP_LIMIT: u32 = 10;

/// Default sliding window length (1 hour).
pub const DEFAULT_WINDOW_MS: u64 = 60 * 60 * 1000;

/// Records untouched for this long are deleted by `cleanup()` (24 hours).
pub const IDLE_TTL_SECS: u64 = 24 * 60 * 60;

/// Default interval between cleanup sweeps (1 hour).
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60 * 60;

/// Default prefix for Redis keys.
pub const DEFAULT_KEY_PREFIX: &str = "folio:rl";

/// IPv6 prefix segments for rate limiting (uses /64)
pub const IPV6_PREFIX_SEGMENTS: usize = 4;

/// Redis key pre-allocation size
pub const REDIS_KEY_CAPACITY: usize = 96;
