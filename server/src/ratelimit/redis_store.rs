//! Redis-backed attempt store.
//!
//! Each record is split across two keys sharing a base of
//! `{prefix}:{kind}:{identifier}`:
//!
//! - `…:attempts`: sorted set, score = attempt time in ms, member = `{seq}:{0|1}`
//! - `…:meta`: hash with `identifier`, `type`, `created_at`, `updated_at`, `total`
//!
//! A global `{prefix}:index` sorted set tracks every base by `updated_at` so
//! cleanup can find idle records without `SCAN`. Every mutation runs as a
//! single Lua script, which is what makes prune and append atomic per record.
//! Both record keys also carry an `EXPIRE` of the idle TTL, refreshed on every
//! mutation, so Redis drops abandoned records even if cleanup never runs.
//!
//! Cleanup builds keys inside the script, so the store is not cluster-safe.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fred::interfaces::LuaInterface;
use fred::prelude::*;
use fred::types::FromValue;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::ratelimit::{
    Attempt, AttemptStore, RateLimitConfig, RateLimitRecord, RecordKey, StoreError,
    REDIS_KEY_CAPACITY,
};

/// Removes attempts at or before the window start and upserts the record.
///
/// KEYS: attempts, meta, index
/// ARGV: window_start_ms, now_ms, identifier, type, ttl_secs, index_member
const PRUNE_SCRIPT: &str = r"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
redis.call('HSETNX', KEYS[2], 'identifier', ARGV[3])
redis.call('HSETNX', KEYS[2], 'type', ARGV[4])
redis.call('HSETNX', KEYS[2], 'created_at', ARGV[2])
redis.call('HSETNX', KEYS[2], 'total', 0)
redis.call('HSET', KEYS[2], 'updated_at', ARGV[2])
redis.call('EXPIRE', KEYS[2], ARGV[5])
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[5])
end
redis.call('ZADD', KEYS[3], ARGV[2], ARGV[6])
return 1
";

/// Appends one attempt, optionally pruning first, and upserts the record.
///
/// KEYS: attempts, meta, index
/// ARGV: window_start_ms, now_ms, identifier, type, ttl_secs, index_member, success, prune
const RECORD_SCRIPT: &str = r"
if ARGV[8] == '1' then
    redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
end
redis.call('HSETNX', KEYS[2], 'identifier', ARGV[3])
redis.call('HSETNX', KEYS[2], 'type', ARGV[4])
redis.call('HSETNX', KEYS[2], 'created_at', ARGV[2])
local seq = redis.call('HINCRBY', KEYS[2], 'total', 1)
redis.call('ZADD', KEYS[1], ARGV[2], seq .. ':' .. ARGV[7])
redis.call('HSET', KEYS[2], 'updated_at', ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[5])
redis.call('EXPIRE', KEYS[2], ARGV[5])
redis.call('ZADD', KEYS[3], ARGV[2], ARGV[6])
return seq
";

/// Reads a record as a flat list: created_at, updated_at, total, then member/score pairs.
///
/// KEYS: attempts, meta
const READ_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[2]) == 0 then
    return {}
end
local out = {
    redis.call('HGET', KEYS[2], 'created_at') or '0',
    redis.call('HGET', KEYS[2], 'updated_at') or '0',
    redis.call('HGET', KEYS[2], 'total') or '0',
}
local entries = redis.call('ZRANGE', KEYS[1], 0, -1, 'WITHSCORES')
for i = 1, #entries do
    out[#out + 1] = entries[i]
end
return out
";

/// Deletes up to ARGV[3] records idle since before the cutoff.
///
/// KEYS: index
/// ARGV: cutoff_ms, prefix, batch
const CLEANUP_SCRIPT: &str = r"
local stale = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1], 'LIMIT', 0, tonumber(ARGV[3]))
for _, member in ipairs(stale) do
    redis.call('DEL', ARGV[2] .. ':' .. member .. ':attempts', ARGV[2] .. ':' .. member .. ':meta')
end
if #stale > 0 then
    redis.call('ZREM', KEYS[1], unpack(stale))
end
return #stale
";

/// Index entries removed per cleanup script call.
const CLEANUP_BATCH: u64 = 500;

#[derive(Debug, Clone, Copy)]
enum Script {
    Prune,
    Record,
    Read,
    Cleanup,
}

impl Script {
    const ALL: [Self; 4] = [Self::Prune, Self::Record, Self::Read, Self::Cleanup];

    const fn source(self) -> &'static str {
        match self {
            Self::Prune => PRUNE_SCRIPT,
            Self::Record => RECORD_SCRIPT,
            Self::Read => READ_SCRIPT,
            Self::Cleanup => CLEANUP_SCRIPT,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Prune => "prune",
            Self::Record => "record",
            Self::Read => "read",
            Self::Cleanup => "cleanup",
        }
    }
}

/// Script SHAs for Lua scripts loaded in Redis.
#[derive(Clone, Default)]
struct ScriptShas {
    prune: String,
    record: String,
    read: String,
    cleanup: String,
}

impl ScriptShas {
    fn get(&self, script: Script) -> &str {
        match script {
            Script::Prune => &self.prune,
            Script::Record => &self.record,
            Script::Read => &self.read,
            Script::Cleanup => &self.cleanup,
        }
    }

    fn set(&mut self, script: Script, sha: String) {
        match script {
            Script::Prune => self.prune = sha,
            Script::Record => self.record = sha,
            Script::Read => self.read = sha,
            Script::Cleanup => self.cleanup = sha,
        }
    }
}

/// Attempt store backed by Redis.
///
/// Shared across server instances; limits survive restarts.
#[derive(Clone)]
pub struct RedisAttemptStore {
    redis: Client,
    key_prefix: Arc<str>,
    idle_ttl_secs: u64,
    scripts: Arc<RwLock<ScriptShas>>,
}

impl RedisAttemptStore {
    /// Creates a new store.
    ///
    /// Call `init()` after creation to load the Lua scripts into Redis.
    pub fn new(redis: Client, config: &RateLimitConfig) -> Self {
        Self {
            redis,
            key_prefix: Arc::from(config.key_prefix.as_str()),
            idle_ttl_secs: config.idle_ttl_secs,
            scripts: Arc::new(RwLock::new(ScriptShas::default())),
        }
    }

    /// Loads the Lua scripts into Redis.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.load_scripts().await
    }

    /// Loads or reloads Lua scripts into Redis.
    ///
    /// Called during init and when NOSCRIPT errors are encountered.
    async fn load_scripts(&self) -> Result<(), StoreError> {
        let mut shas = ScriptShas::default();
        for script in Script::ALL {
            let sha: String = self.redis.script_load(script.source()).await?;
            debug!(script = script.name(), sha = %sha, "Lua script loaded");
            shas.set(script, sha);
        }

        info!("Rate limit Lua scripts loaded into Redis");

        *self.scripts.write().await = shas;
        Ok(())
    }

    /// Checks if an error is a NOSCRIPT error (script not found in Redis).
    fn is_noscript_error(error: &Error) -> bool {
        error.to_string().contains("NOSCRIPT")
    }

    async fn sha(&self, script: Script) -> String {
        self.scripts.read().await.get(script).to_string()
    }

    /// Runs a loaded script, reloading once on NOSCRIPT (e.g. after a Redis restart).
    async fn run_script<R: FromValue + Send>(
        &self,
        script: Script,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> Result<R, StoreError> {
        // Commands queued during a reconnect would stall the request path
        if !self.redis.is_connected() {
            return Err(StoreError::Unavailable("redis client is not connected".into()));
        }

        let mut sha = self.sha(script).await;
        if sha.is_empty() {
            self.load_scripts().await?;
            sha = self.sha(script).await;
        }

        match self
            .redis
            .evalsha::<R, _, _, _>(sha.as_str(), keys.clone(), args.clone())
            .await
        {
            Ok(r) => Ok(r),
            Err(e) if Self::is_noscript_error(&e) => {
                warn!(script = script.name(), "NOSCRIPT error, reloading Lua scripts");
                self.load_scripts().await?;
                let new_sha = self.sha(script).await;
                Ok(self.redis.evalsha(new_sha.as_str(), keys, args).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Shared base for a record's keys, e.g. `folio:rl:email:a@b.com`.
    fn base_key(&self, key: &RecordKey) -> String {
        let mut base = String::with_capacity(REDIS_KEY_CAPACITY);
        base.push_str(&self.key_prefix);
        base.push(':');
        base.push_str(&Self::index_member(key));
        base
    }

    /// Member stored in the index sorted set: `{kind}:{identifier}`.
    fn index_member(key: &RecordKey) -> String {
        format!("{}:{}", key.kind().as_str(), key.identifier())
    }

    fn index_key(&self) -> String {
        format!("{}:index", self.key_prefix)
    }

    /// KEYS for the prune and record scripts.
    fn record_keys(&self, key: &RecordKey) -> Vec<String> {
        let base = self.base_key(key);
        vec![
            format!("{base}:attempts"),
            format!("{base}:meta"),
            self.index_key(),
        ]
    }

    /// Common ARGV prefix for the prune and record scripts.
    fn record_args(&self, key: &RecordKey, window_start_ms: &str, now: DateTime<Utc>) -> Vec<String> {
        vec![
            window_start_ms.to_string(),
            now.timestamp_millis().to_string(),
            key.identifier().to_string(),
            key.kind().as_str().to_string(),
            self.idle_ttl_secs.to_string(),
            Self::index_member(key),
        ]
    }

    async fn record(
        &self,
        key: &RecordKey,
        attempt: Attempt,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let window_start_ms = window_start
            .map_or_else(|| "-inf".to_string(), |w| w.timestamp_millis().to_string());
        let mut args = self.record_args(key, &window_start_ms, attempt.timestamp);
        args.push(if attempt.success { "1" } else { "0" }.to_string());
        args.push(if window_start.is_some() { "1" } else { "0" }.to_string());

        let seq: i64 = self
            .run_script(Script::Record, self.record_keys(key), args)
            .await?;
        debug!(identifier = %key.identifier(), kind = %key.kind(), seq, "Attempt stored");
        Ok(())
    }

    fn parse_record(&self, key: &RecordKey, raw: &[String]) -> Result<RateLimitRecord, StoreError> {
        let base = self.base_key(key);
        if raw.len() < 3 || (raw.len() - 3) % 2 != 0 {
            return Err(StoreError::corrupt(base, format!("unexpected reply length {}", raw.len())));
        }

        let created_at = parse_millis(&base, &raw[0])?;
        let updated_at = parse_millis(&base, &raw[1])?;
        let total_recorded = raw[2]
            .parse()
            .map_err(|_| StoreError::corrupt(&base, format!("bad total {:?}", raw[2])))?;

        let attempts = raw[3..]
            .chunks_exact(2)
            .map(|pair| {
                let success = pair[0].ends_with(":1");
                parse_millis(&base, &pair[1]).map(|timestamp| Attempt { timestamp, success })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RateLimitRecord {
            identifier: key.identifier().to_string(),
            kind: key.kind(),
            attempts,
            total_recorded,
            created_at,
            updated_at,
        })
    }
}

/// Parses a millisecond timestamp. Sorted set scores may come back as floats.
fn parse_millis(key: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    let ms = raw
        .parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|f| f as i64))
        .ok_or_else(|| StoreError::corrupt(key, format!("bad timestamp {raw:?}")))?;
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::corrupt(key, format!("timestamp out of range {ms}")))
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn prune(
        &self,
        key: &RecordKey,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let args = self.record_args(key, &window_start.timestamp_millis().to_string(), now);
        let _: i64 = self
            .run_script(Script::Prune, self.record_keys(key), args)
            .await?;
        Ok(())
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<RateLimitRecord>, StoreError> {
        let keys = self.record_keys(key).into_iter().take(2).collect();
        let raw: Vec<String> = self.run_script(Script::Read, keys, Vec::new()).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        self.parse_record(key, &raw).map(Some)
    }

    async fn append(
        &self,
        key: &RecordKey,
        attempt: Attempt,
        window_start: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.record(key, attempt, Some(window_start)).await
    }

    async fn push(&self, key: &RecordKey, attempt: Attempt) -> Result<(), StoreError> {
        self.record(key, attempt, None).await
    }

    async fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut removed = 0u64;
        loop {
            let batch: u64 = self
                .run_script(
                    Script::Cleanup,
                    vec![self.index_key()],
                    vec![
                        cutoff.timestamp_millis().to_string(),
                        self.key_prefix.to_string(),
                        CLEANUP_BATCH.to_string(),
                    ],
                )
                .await?;
            removed += batch;
            if batch < CLEANUP_BATCH {
                return Ok(removed);
            }
        }
    }
}
