//! Redis shared cache

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};

use crate::domain::cache::SharedCache;
use crate::domain::DomainError;

const SCAN_BATCH: usize = 500;

#[derive(Debug, Clone)]
pub struct RedisSharedCacheConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Namespace prepended to every key
    pub key_prefix: Option<String>,
}

impl RedisSharedCacheConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: None,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

#[derive(Clone)]
pub struct RedisSharedCache {
    connection: ConnectionManager,
    config: RedisSharedCacheConfig,
}

impl fmt::Debug for RedisSharedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSharedCache")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisSharedCache {
    pub async fn connect(config: RedisSharedCacheConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| DomainError::cache(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection, config })
    }

    fn prefix_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        let mut conn = self.connection.clone();

        conn.get(self.prefix_key(key))
            .await
            .map_err(|e| DomainError::cache(format!("Failed to get key '{}': {}", key, e)))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        conn.pset_ex::<_, _, ()>(self.prefix_key(key), value, ttl_ms)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to set key '{}': {}", key, e)))
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let deleted: usize = conn
            .del(self.prefix_key(key))
            .await
            .map_err(|e| DomainError::cache(format!("Failed to delete key '{}': {}", key, e)))?;

        Ok(deleted > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, DomainError> {
        let pattern = format!("{}*", escape_glob(&self.prefix_key(prefix)));
        let mut conn = self.connection.clone();

        scan_delete(&mut conn, &pattern).await.map_err(|e| {
            DomainError::cache(format!("Failed to delete prefix '{}': {}", prefix, e))
        })
    }

    async fn size(&self) -> Result<usize, DomainError> {
        let mut conn = self.connection.clone();

        match &self.config.key_prefix {
            Some(_) => {
                let pattern = format!("{}*", escape_glob(&self.prefix_key("")));
                scan_count(&mut conn, &pattern)
                    .await
                    .map_err(|e| DomainError::cache(format!("Failed to scan keys: {}", e)))
            }
            None => redis::cmd("DBSIZE")
                .query_async(&mut conn)
                .await
                .map_err(|e| DomainError::cache(format!("Failed to get database size: {}", e))),
        }
    }

    async fn ping(&self) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| DomainError::cache(format!("Redis ping failed: {}", e)))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Escape glob metacharacters so a literal prefix can be used with MATCH
pub(crate) fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// SCAN for `pattern` and DEL every batch found
pub(crate) async fn scan_delete(conn: &mut ConnectionManager, pattern: &str) -> RedisResult<usize> {
    let mut cursor = 0u64;
    let mut deleted = 0usize;

    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await?;

        if !keys.is_empty() {
            let n: usize = conn.del(&keys).await?;
            deleted += n;
        }

        cursor = next;
        if cursor == 0 {
            return Ok(deleted);
        }
    }
}

async fn scan_count(conn: &mut ConnectionManager, pattern: &str) -> RedisResult<usize> {
    let mut cursor = 0u64;
    let mut count = 0usize;

    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await?;

        count += keys.len();
        cursor = next;
        if cursor == 0 {
            return Ok(count);
        }
    }
}
