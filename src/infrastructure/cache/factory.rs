//! Shared cache selection at startup

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::cache::SharedCache;
use crate::domain::DomainError;

use super::in_memory::{InMemorySharedCache, InMemorySharedCacheConfig};
use super::redis::{RedisSharedCache, RedisSharedCacheConfig};

/// Supported L2 backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedCacheBackend {
    /// No shared layer, L1 only
    Disabled,
    /// Process-local moka store
    #[default]
    InMemory,
    Redis,
}

impl std::fmt::Display for SharedCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::InMemory => write!(f, "in_memory"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for SharedCacheBackend {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disabled" | "none" => Ok(Self::Disabled),
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            _ => Err(DomainError::configuration(format!(
                "Unknown cache backend: {}. Valid backends: disabled, in_memory, redis",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedCacheSettings {
    pub backend: SharedCacheBackend,
    pub redis_url: Option<String>,
    pub key_prefix: Option<String>,
    pub max_capacity: Option<u64>,
}

impl SharedCacheSettings {
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: SharedCacheBackend::Redis,
            redis_url: Some(url.into()),
            ..Default::default()
        }
    }
}

pub async fn create_shared_cache(
    settings: &SharedCacheSettings,
) -> Result<Option<Arc<dyn SharedCache>>, DomainError> {
    match settings.backend {
        SharedCacheBackend::Disabled => {
            info!("Shared cache disabled, running L1 only");
            Ok(None)
        }
        SharedCacheBackend::InMemory => {
            let mut config = InMemorySharedCacheConfig::default();
            if let Some(capacity) = settings.max_capacity {
                config.max_capacity = capacity;
            }

            info!(max_capacity = config.max_capacity, "Using in-memory shared cache");
            Ok(Some(Arc::new(InMemorySharedCache::with_config(config))))
        }
        SharedCacheBackend::Redis => {
            let url = settings.redis_url.clone().ok_or_else(|| {
                DomainError::configuration("Redis URL is required for the redis cache backend")
            })?;

            let mut config = RedisSharedCacheConfig::new(url);
            if let Some(prefix) = &settings.key_prefix {
                config = config.with_key_prefix(prefix.clone());
            }

            let cache = RedisSharedCache::connect(config).await?;
            info!("Connected to Redis shared cache");
            Ok(Some(Arc::new(cache)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("in_memory".parse::<SharedCacheBackend>().unwrap(), SharedCacheBackend::InMemory);
        assert_eq!("memory".parse::<SharedCacheBackend>().unwrap(), SharedCacheBackend::InMemory);
        assert_eq!("REDIS".parse::<SharedCacheBackend>().unwrap(), SharedCacheBackend::Redis);
        assert_eq!("none".parse::<SharedCacheBackend>().unwrap(), SharedCacheBackend::Disabled);
        assert!("memcached".parse::<SharedCacheBackend>().is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(SharedCacheBackend::InMemory.to_string(), "in_memory");
        assert_eq!(SharedCacheBackend::Redis.to_string(), "redis");
    }

    #[tokio::test]
    async fn test_create_in_memory() {
        let cache = create_shared_cache(&SharedCacheSettings::default())
            .await
            .unwrap()
            .unwrap();

        cache.set_raw("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get_raw("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.name(), "in_memory");
    }

    #[tokio::test]
    async fn test_create_disabled() {
        let settings = SharedCacheSettings {
            backend: SharedCacheBackend::Disabled,
            ..Default::default()
        };
        assert!(create_shared_cache(&settings).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redis_requires_url() {
        let settings = SharedCacheSettings {
            backend: SharedCacheBackend::Redis,
            ..Default::default()
        };
        assert!(create_shared_cache(&settings).await.is_err());
    }
}
