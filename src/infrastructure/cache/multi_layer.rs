//! Two-layer cache: in-process LRU in front of a shared store
//!
//! Lookup goes L1, then L2 (writing an L2 hit back into L1), then the
//! caller's compute. Every L2 call is bounded by a timeout; an L2 failure is
//! logged, counted and treated as a miss so the cache never fails a request.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::lru::{DEFAULT_L1_TTL, LruLayer};
use crate::domain::cache::{CacheKey, SharedCache};
use crate::domain::{CacheError, DomainError};
use crate::infrastructure::observability::{record_cache_error, record_cache_lookup};

#[derive(Debug, Clone)]
pub struct MultiLayerCacheConfig {
    pub l1_capacity: usize,
    pub l1_ttl: Duration,
    pub l2_ttl: Duration,
    /// Upper bound on any single L2 round trip
    pub l2_timeout: Duration,
}

impl Default for MultiLayerCacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 10_000,
            l1_ttl: DEFAULT_L1_TTL,
            l2_ttl: Duration::from_secs(3600),
            l2_timeout: Duration::from_millis(100),
        }
    }
}

/// Per-write TTLs for each layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub l1: Duration,
    pub l2: Duration,
}

impl CacheTtl {
    pub fn new(l1: Duration, l2: Duration) -> Self {
        Self { l1, l2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub l2_errors: u64,
    pub l1_entries: usize,
    pub l1_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l2_backend: Option<String>,
    pub l1_hit_rate: f64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvalidationReport {
    pub l1_removed: usize,
    pub l2_removed: usize,
}

impl InvalidationReport {
    pub fn total(&self) -> usize {
        self.l1_removed + self.l2_removed
    }
}

#[derive(Debug, Default)]
struct Counters {
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    l2_errors: AtomicU64,
}

fn rate(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[derive(Debug)]
pub struct MultiLayerCache {
    l1: LruLayer,
    l2: Option<Arc<dyn SharedCache>>,
    config: MultiLayerCacheConfig,
    counters: Counters,
    // Bumped by every invalidation, between the L2 delete and the L1 sweep
    generation: AtomicU64,
}

impl MultiLayerCache {
    pub fn new(config: MultiLayerCacheConfig, l2: Option<Arc<dyn SharedCache>>) -> Self {
        let capacity = NonZeroUsize::new(config.l1_capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            l1: LruLayer::with_default_ttl(capacity, config.l1_ttl),
            l2,
            config,
            counters: Counters::default(),
            generation: AtomicU64::new(0),
        }
    }

    /// L1 only; used when no shared store is configured
    pub fn l1_only(config: MultiLayerCacheConfig) -> Self {
        Self::new(config, None)
    }

    pub fn default_ttl(&self) -> CacheTtl {
        CacheTtl::new(self.config.l1_ttl, self.config.l2_ttl)
    }

    pub fn l2_name(&self) -> Option<&'static str> {
        self.l2.as_ref().map(|l2| l2.name())
    }

    pub async fn get_raw(&self, key: &str) -> Option<Arc<str>> {
        if let Some(value) = self.l1.get(key) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            record_cache_lookup("l1", true);
            return Some(value);
        }

        self.counters.l1_misses.fetch_add(1, Ordering::Relaxed);
        record_cache_lookup("l1", false);

        let l2 = self.l2.as_ref()?;
        let generation = self.generation.load(Ordering::SeqCst);
        let found = match tokio::time::timeout(self.config.l2_timeout, l2.get_raw(key)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                self.l2_failed("get", CacheError::L2Unavailable(e.to_string()));
                return None;
            }
            Err(_) => {
                self.l2_failed("get", CacheError::L2Unavailable("timed out".to_string()));
                return None;
            }
        };

        match found {
            Some(value) => {
                self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                record_cache_lookup("l2", true);
                let value: Arc<str> = Arc::from(value);
                self.l1.put(key, Arc::clone(&value), Some(self.config.l1_ttl));
                // An invalidation overlapped the L2 read; the value may be stale
                if self.generation.load(Ordering::SeqCst) != generation {
                    self.l1.remove(key);
                }
                Some(value)
            }
            None => {
                self.counters.l2_misses.fetch_add(1, Ordering::Relaxed);
                record_cache_lookup("l2", false);
                None
            }
        }
    }

    /// Typed lookup. An entry that no longer deserializes counts as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.l1.remove(key);
                None
            }
        }
    }

    /// Write through to both layers. L2 failures are absorbed.
    pub async fn set_raw(&self, key: &str, value: Arc<str>, ttl: CacheTtl) {
        self.l1.put(key, Arc::clone(&value), Some(ttl.l1));

        let Some(l2) = self.l2.as_ref() else {
            return;
        };

        match tokio::time::timeout(self.config.l2_timeout, l2.set_raw(key, &value, ttl.l2)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.l2_failed("set", CacheError::L2Unavailable(e.to_string())),
            Err(_) => self.l2_failed("set", CacheError::L2Unavailable("timed out".to_string())),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: CacheTtl,
    ) -> Result<(), DomainError> {
        let json = serde_json::to_string(value)
            .map_err(|e| DomainError::cache(format!("Failed to serialize cache value: {}", e)))?;

        self.set_raw(key, Arc::from(json), ttl).await;
        Ok(())
    }

    /// Remove every key starting with `prefix` from both layers
    ///
    /// L2 goes first so a concurrent L1 miss cannot refill L1 from an L2
    /// entry that is about to disappear.
    pub async fn invalidate(&self, prefix: &str) -> InvalidationReport {
        let l2_removed = match self.l2.as_ref() {
            Some(l2) => {
                match tokio::time::timeout(self.config.l2_timeout, l2.delete_prefix(prefix)).await {
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => {
                        self.l2_failed("invalidate", CacheError::L2Unavailable(e.to_string()));
                        0
                    }
                    Err(_) => {
                        self.l2_failed(
                            "invalidate",
                            CacheError::L2Unavailable("timed out".to_string()),
                        );
                        0
                    }
                }
            }
            None => 0,
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        let l1_removed = self.l1.remove_prefix(prefix);

        debug!(prefix = %prefix, l1_removed, l2_removed, "Cache invalidated");

        InvalidationReport {
            l1_removed,
            l2_removed,
        }
    }

    /// Return the cached value for `key`, or run `compute` and write its
    /// result through to both layers.
    ///
    /// Errors from `compute` are returned as-is and never cached. Dropping
    /// the returned future before `compute` resolves writes nothing.
    pub async fn with_cache<T, E, F, Fut>(&self, key: &str, ttl: CacheTtl, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.with_cache_when(key, ttl, |_| true, compute)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`with_cache`](Self::with_cache), but only successful values
    /// accepted by `should_cache` are written, and the lookup status is
    /// reported alongside the value.
    pub async fn with_cache_when<T, E, P, F, Fut>(
        &self,
        key: &str,
        ttl: CacheTtl,
        should_cache: P,
        compute: F,
    ) -> Result<(T, CacheStatus), E>
    where
        T: Serialize + DeserializeOwned,
        P: FnOnce(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok((hit, CacheStatus::Hit));
        }

        let value = compute().await?;

        if should_cache(&value) {
            if let Err(e) = self.set(key, &value, ttl).await {
                warn!(key = %key, error = %e, "Skipping cache write");
            }
        }

        Ok((value, CacheStatus::Miss))
    }

    pub async fn ping_l2(&self) -> Result<(), DomainError> {
        match self.l2.as_ref() {
            Some(l2) => tokio::time::timeout(self.config.l2_timeout, l2.ping())
                .await
                .map_err(|_| DomainError::cache("L2 ping timed out"))?,
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let l1_hits = self.counters.l1_hits.load(Ordering::Relaxed);
        let l1_misses = self.counters.l1_misses.load(Ordering::Relaxed);
        let l2_hits = self.counters.l2_hits.load(Ordering::Relaxed);

        CacheStats {
            l1_hits,
            l1_misses,
            l2_hits,
            l2_misses: self.counters.l2_misses.load(Ordering::Relaxed),
            l2_errors: self.counters.l2_errors.load(Ordering::Relaxed),
            l1_entries: self.l1.len(),
            l1_capacity: self.l1.capacity(),
            l2_backend: self.l2_name().map(str::to_string),
            l1_hit_rate: rate(l1_hits, l1_hits + l1_misses),
            hit_rate: rate(l1_hits + l2_hits, l1_hits + l1_misses),
        }
    }

    fn l2_failed(&self, operation: &'static str, error: CacheError) {
        self.counters.l2_errors.fetch_add(1, Ordering::Relaxed);
        record_cache_error(operation);
        warn!(
            operation,
            code = error.code(),
            error = %error,
            "L2 cache degraded, continuing with L1 only"
        );
    }
}

/// Memoizes an async call through a [`MultiLayerCache`]
///
/// The key is the namespace plus a stable hash of the serialized arguments.
#[derive(Debug, Clone)]
pub struct CachedCall {
    cache: Arc<MultiLayerCache>,
    namespace: String,
    ttl: CacheTtl,
}

impl CachedCall {
    pub fn new(cache: Arc<MultiLayerCache>, namespace: impl Into<String>) -> Self {
        let ttl = cache.default_ttl();
        Self {
            cache,
            namespace: namespace.into(),
            ttl,
        }
    }

    pub fn with_ttl(mut self, ttl: CacheTtl) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key_for<A: Serialize + ?Sized>(&self, args: &A) -> Result<CacheKey, DomainError> {
        CacheKey::for_call(&self.namespace, args)
    }

    pub async fn call<A, T, E, F, Fut>(&self, args: &A, compute: F) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        E: From<DomainError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.key_for(args)?;
        self.cache.with_cache(key.as_str(), self.ttl, compute).await
    }

    /// Drop every memoized result in this namespace
    pub async fn invalidate_all(&self) -> InvalidationReport {
        self.cache.invalidate(&format!("{}:", self.namespace)).await
    }
}
