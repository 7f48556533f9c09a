//! In-process shared cache backed by moka
//!
//! Stands in for Redis as the L2 of a single instance and in tests. Each
//! entry carries its own TTL through moka's per-entry expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;

use crate::domain::cache::SharedCache;
use crate::domain::DomainError;

#[derive(Debug, Clone)]
pub struct InMemorySharedCacheConfig {
    pub max_capacity: u64,
}

impl Default for InMemorySharedCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 100_000,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    data: Arc<str>,
    ttl: Duration,
}

struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Debug)]
pub struct InMemorySharedCache {
    cache: MokaCache<String, Entry>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::with_config(InMemorySharedCacheConfig::default())
    }

    pub fn with_config(config: InMemorySharedCacheConfig) -> Self {
        Self {
            cache: MokaCache::builder()
                .max_capacity(config.max_capacity)
                .expire_after(PerEntryExpiry)
                .build(),
        }
    }
}

impl Default for InMemorySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        Ok(self.cache.get(key).await.map(|e| e.data.to_string()))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        self.cache
            .insert(
                key.to_string(),
                Entry {
                    data: Arc::from(value),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, DomainError> {
        let keys: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k)
            .collect();

        let mut removed = 0;
        for key in keys {
            if self.cache.remove(key.as_str()).await.is_some() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn size(&self) -> Result<usize, DomainError> {
        self.cache.run_pending_tasks().await;
        Ok(self.cache.entry_count() as usize)
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
