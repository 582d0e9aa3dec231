//! Rate limiting for the contact form.
//!
//! Tracks timestamped attempts per sender email and per client IP inside a
//! sliding window. History lives in an [`AttemptStore`] (Redis in production,
//! an in-process map otherwise) so limits hold across restarts and instances.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod ip;
pub mod limiter;
pub mod redis_store;
pub mod store;
pub mod sweeper;
pub mod types;

pub use clock::*;
pub use config::*;
pub use constants::*;
pub use error::*;
pub use ip::*;
pub use limiter::*;
pub use redis_store::RedisAttemptStore;
pub use store::*;
pub use sweeper::spawn_cleanup_task;
pub use types::*;
