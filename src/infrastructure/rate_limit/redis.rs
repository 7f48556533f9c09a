//! Redis-backed rate limit state
//!
//! Each algorithm runs as one Lua script, so the read, the decision and the
//! commit are a single atomic step on the server. The scripts return raw
//! per-quota numbers which go through the same conversion as the
//! in-process algorithms.

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use crate::domain::rate_limit::{
    Algorithm, BucketOutcome, LimitPolicy, QuotaCheck, RateLimitDecision, RateLimitStore,
};
use crate::domain::DomainError;
use crate::infrastructure::cache::{escape_glob, scan_delete};

// Wall-clock hour and minute counters. Needs `now` and `limits`; defines
// `keys`, `used`, `resets` and `commit_counters`.
macro_rules! fixed_counters_lua {
    () => {
        r#"
local periods = {3600000, 60000}
local keys, used, resets = {}, {}, {}
for i = 1, 2 do
  local start = math.floor(now / periods[i]) * periods[i]
  keys[i] = KEYS[1] .. ':' .. periods[i] .. ':' .. start
  used[i] = tonumber(redis.call('GET', keys[i]) or '0')
  resets[i] = start + periods[i] - now
end
local function commit_counters()
  for i = 1, 2 do
    redis.call('INCR', keys[i])
    redis.call('PEXPIRE', keys[i], resets[i] + 1000)
  end
end
"#
    };
}

const FIXED_WINDOW_LUA: &str = concat!(
    r#"
local now = tonumber(ARGV[1])
local limits = {tonumber(ARGV[2]), tonumber(ARGV[3])}
"#,
    fixed_counters_lua!(),
    r#"
local allowed = used[1] < limits[1] and used[2] < limits[2]
if allowed then commit_counters() end
return {allowed and 1 or 0, limits[1], used[1], resets[1], limits[2], used[2], resets[2]}
"#
);

const SLIDING_WINDOW_LUA: &str = r#"
local now = tonumber(ARGV[1])
local limits = {tonumber(ARGV[2]), tonumber(ARGV[3])}
local n = tonumber(ARGV[4])
local periods = {3600000, 60000}
local hkeys, currents, used, resets = {}, {}, {}, {}
for i = 1, 2 do
  local size = math.max(math.floor(periods[i] / n), 1)
  local current = math.floor(now / size)
  local oldest = current + 1 - n
  local hkey = KEYS[1] .. ':' .. periods[i]
  local fields = redis.call('HGETALL', hkey)
  local total, front = 0, nil
  for j = 1, #fields, 2 do
    local idx = tonumber(fields[j])
    if idx < oldest then
      redis.call('HDEL', hkey, fields[j])
    else
      total = total + tonumber(fields[j + 1])
      if front == nil or idx < front then front = idx end
    end
  end
  hkeys[i], currents[i], used[i] = hkey, current, total
  if front == nil then resets[i] = size * n else resets[i] = (front + n) * size - now end
end
local allowed = used[1] < limits[1] and used[2] < limits[2]
if allowed then
  for i = 1, 2 do
    redis.call('HINCRBY', hkeys[i], string.format('%d', currents[i]), 1)
    redis.call('PEXPIRE', hkeys[i], periods[i] + 1000)
  end
end
return {allowed and 1 or 0, limits[1], used[1], resets[1], limits[2], used[2], resets[2]}
"#;

// Bucket replies: fits, capacity, remaining, reset, retry, then the hour
// and minute counters as in the window replies
const TOKEN_BUCKET_LUA: &str = concat!(
    r#"
local now = tonumber(ARGV[1])
local per_hour = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])
local limits = {per_hour, capacity}
"#,
    fixed_counters_lua!(),
    r#"
local state = redis.call('HMGET', KEYS[1], 'level', 'ts')
local level, ts = tonumber(state[1]), tonumber(state[2])
if level == nil then level, ts = capacity, now end
level = math.min(capacity, level + math.max(now - ts, 0) * per_hour / 3600000)
local fits, after, retry = level >= 1, level, 0
if fits then
  after = level - 1
else
  retry = math.ceil((1 - level) * 3600000 / per_hour)
end
if fits and used[1] < limits[1] and used[2] < limits[2] then
  level = after
  commit_counters()
end
redis.call('HSET', KEYS[1], 'level', tostring(level), 'ts', math.max(now, ts))
redis.call('PEXPIRE', KEYS[1], math.ceil(capacity * 3600000 / per_hour) + 1000)
local reset = math.ceil((capacity - after) * 3600000 / per_hour)
return {fits and 1 or 0, capacity, math.floor(after), reset, retry,
  limits[1], used[1], resets[1], limits[2], used[2], resets[2]}
"#
);

const LEAKY_BUCKET_LUA: &str = concat!(
    r#"
local now = tonumber(ARGV[1])
local per_hour = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])
local limits = {per_hour, capacity}
"#,
    fixed_counters_lua!(),
    r#"
local state = redis.call('HMGET', KEYS[1], 'level', 'ts')
local level, ts = tonumber(state[1]), tonumber(state[2])
if level == nil then level, ts = 0, now end
level = math.max(0, level - math.max(now - ts, 0) * per_hour / 3600000)
local fits, after, retry = level + 1 <= capacity, level, 0
if fits then
  after = level + 1
else
  retry = math.ceil((level + 1 - capacity) * 3600000 / per_hour)
end
if fits and used[1] < limits[1] and used[2] < limits[2] then
  level = after
  commit_counters()
end
redis.call('HSET', KEYS[1], 'level', tostring(level), 'ts', math.max(now, ts))
redis.call('PEXPIRE', KEYS[1], math.ceil(level * 3600000 / per_hour) + 1000)
local reset = math.ceil(after * 3600000 / per_hour)
return {fits and 1 or 0, capacity, math.floor(math.max(capacity - after, 0)), reset, retry,
  limits[1], used[1], resets[1], limits[2], used[2], resets[2]}
"#
);

#[derive(Debug, Clone)]
pub struct RedisRateLimitStoreConfig {
    pub url: String,
    pub key_prefix: String,
}

impl RedisRateLimitStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "rl".to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

#[derive(Clone)]
pub struct RedisRateLimitStore {
    connection: ConnectionManager,
    key_prefix: String,
    fixed_window: Script,
    sliding_window: Script,
    token_bucket: Script,
    leaky_bucket: Script,
}

impl fmt::Debug for RedisRateLimitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisRateLimitStore")
            .field("key_prefix", &self.key_prefix)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisRateLimitStore {
    pub async fn connect(config: RedisRateLimitStoreConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            DomainError::storage(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            key_prefix: config.key_prefix,
            fixed_window: Script::new(FIXED_WINDOW_LUA),
            sliding_window: Script::new(SLIDING_WINDOW_LUA),
            token_bucket: Script::new(TOKEN_BUCKET_LUA),
            leaky_bucket: Script::new(LEAKY_BUCKET_LUA),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    fn script_for(&self, algorithm: Algorithm) -> &Script {
        match algorithm {
            Algorithm::FixedWindow => &self.fixed_window,
            Algorithm::SlidingWindow => &self.sliding_window,
            Algorithm::TokenBucket => &self.token_bucket,
            Algorithm::LeakyBucket => &self.leaky_bucket,
        }
    }
}

/// Turn a script reply into a decision
fn decode_reply(algorithm: Algorithm, reply: &[i64]) -> Result<RateLimitDecision, DomainError> {
    let malformed = || {
        DomainError::storage(format!(
            "Unexpected {} script reply: {:?}",
            algorithm, reply
        ))
    };
    let to_u32 = |v: i64| u32::try_from(v.max(0)).map_err(|_| malformed());
    let to_u64 = |v: i64| Ok::<u64, DomainError>(v.max(0) as u64);

    let quota = |limit: i64, used: i64, reset: i64| {
        Ok::<QuotaCheck, DomainError>(QuotaCheck {
            limit: to_u32(limit)?,
            used: to_u32(used)?,
            reset_in_ms: to_u64(reset)?,
        })
    };

    if algorithm.is_bucket() {
        let [fits, capacity, remaining, reset, retry, hour_limit, hour_used, hour_reset, minute_limit, minute_used, minute_reset] =
            *reply
        else {
            return Err(malformed());
        };

        let outcome = BucketOutcome {
            allowed: fits == 1,
            capacity: to_u32(capacity)?,
            remaining: to_u32(remaining)?,
            reset_in_ms: to_u64(reset)?,
            retry_in_ms: to_u64(retry)?,
        };

        return Ok(RateLimitDecision::from_bucket(
            outcome,
            [
                quota(hour_limit, hour_used, hour_reset)?,
                quota(minute_limit, minute_used, minute_reset)?,
            ],
        ));
    }

    let [_, hour_limit, hour_used, hour_reset, minute_limit, minute_used, minute_reset] = *reply
    else {
        return Err(malformed());
    };

    Ok(RateLimitDecision::from_windows(&[
        quota(hour_limit, hour_used, hour_reset)?,
        quota(minute_limit, minute_used, minute_reset)?,
    ]))
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn acquire(
        &self,
        key: &str,
        policy: &LimitPolicy,
        now_ms: u64,
    ) -> Result<RateLimitDecision, DomainError> {
        let mut conn = self.connection.clone();

        let reply: Vec<i64> = self
            .script_for(policy.algorithm)
            .key(self.full_key(key))
            .arg(now_ms)
            .arg(policy.per_hour)
            .arg(policy.per_minute)
            .arg(policy.sub_windows)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| DomainError::storage(format!("Rate limit script failed: {}", e)))?;

        decode_reply(policy.algorithm, &reply)
    }

    async fn reset_prefix(&self, prefix: &str) -> Result<usize, DomainError> {
        let pattern = format!("{}*", escape_glob(&self.full_key(prefix)));
        let mut conn = self.connection.clone();

        scan_delete(&mut conn, &pattern)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to reset rate limits: {}", e)))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rate_limit::MINUTE_MS;

    #[test]
    fn test_decode_window_reply() {
        let decision =
            decode_reply(Algorithm::FixedWindow, &[1, 1000, 10, 3_000_000, 100, 99, 30_000])
                .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.limit, 100);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_in_seconds, 30);
    }

    #[test]
    fn test_decode_rejected_window_reply() {
        let decision =
            decode_reply(Algorithm::SlidingWindow, &[0, 1000, 10, 3_000_000, 100, 100, 12_500])
                .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Some(13));
    }

    #[test]
    fn test_decode_bucket_reply() {
        let decision = decode_reply(
            Algorithm::TokenBucket,
            &[0, 500, 0, 7_200, 360, 10_000, 40, 1_800_000, 500, 3, 30_000],
        )
        .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.limit, 500);
        assert_eq!(decision.retry_after, Some(1));
    }

    #[test]
    fn test_decode_bucket_reply_with_exhausted_hour() {
        let decision = decode_reply(
            Algorithm::LeakyBucket,
            &[1, 500, 420, 7_200, 0, 10_000, 10_000, 1_800_000, 500, 3, 30_000],
        )
        .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.limit, 10_000);
        assert_eq!(decision.retry_after, Some(1_800));
    }

    #[test]
    fn test_decode_rejects_malformed_reply() {
        assert!(decode_reply(Algorithm::LeakyBucket, &[1, 2]).is_err());
        assert!(decode_reply(Algorithm::TokenBucket, &[1, 500, 0, 7_200, 360]).is_err());
        assert!(decode_reply(Algorithm::FixedWindow, &[1, 2, 3, 4, 5]).is_err());
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_fixed_window() {
        let store = RedisRateLimitStore::connect(
            RedisRateLimitStoreConfig::new("redis://127.0.0.1:6379").with_key_prefix("rl-test"),
        )
        .await
        .unwrap();
        store.reset_prefix("key-redis:").await.unwrap();

        let policy = LimitPolicy {
            algorithm: Algorithm::FixedWindow,
            per_hour: 1_000,
            per_minute: 3,
            sub_windows: 12,
        };
        let now = 1_000 * MINUTE_MS;

        for _ in 0..3 {
            assert!(store.acquire("key-redis:free:fixed_window", &policy, now).await.unwrap().allowed);
        }
        assert!(!store.acquire("key-redis:free:fixed_window", &policy, now).await.unwrap().allowed);

        store.reset_prefix("key-redis:").await.unwrap();
    }
}
