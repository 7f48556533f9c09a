//! L1 cache: bounded, exact LRU with per-entry TTL

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

pub const DEFAULT_L1_TTL: Duration = Duration::from_secs(100);

#[derive(Debug, Clone)]
struct L1Entry {
    value: Arc<str>,
    inserted_at: Instant,
    last_accessed_at: Instant,
    expires_at: Instant,
}

impl L1Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Snapshot of an entry's bookkeeping, without touching recency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1EntryMeta {
    pub age: Duration,
    pub idle: Duration,
    pub ttl_remaining: Duration,
}

/// In-process LRU layer
///
/// The mutex is held only for the map operation itself, never across an
/// await point.
#[derive(Debug)]
pub struct LruLayer {
    entries: Mutex<LruCache<String, L1Entry>>,
    default_ttl: Duration,
}

impl LruLayer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::with_default_ttl(capacity, DEFAULT_L1_TTL)
    }

    pub fn with_default_ttl(capacity: NonZeroUsize, default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl,
        }
    }

    /// Look up a key, marking it most recently used. Expired entries are
    /// dropped on sight.
    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed_at = now;
                return Some(Arc::clone(&entry.value));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        None
    }

    /// Insert or replace, evicting the least recently used entry when full
    pub fn put(&self, key: impl Into<String>, value: Arc<str>, ttl: Option<Duration>) {
        let now = Instant::now();
        let entry = L1Entry {
            value,
            inserted_at: now,
            last_accessed_at: now,
            expires_at: now + ttl.unwrap_or(self.default_ttl),
        };

        self.entries.lock().put(key.into(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            entries.pop(key.as_str());
        }

        doomed.len()
    }

    pub fn meta(&self, key: &str) -> Option<L1EntryMeta> {
        let now = Instant::now();
        let entries = self.entries.lock();

        entries.peek(key).filter(|e| !e.is_expired(now)).map(|e| L1EntryMeta {
            age: now.duration_since(e.inserted_at),
            idle: now.duration_since(e.last_accessed_at),
            ttl_remaining: e.expires_at.duration_since(now),
        })
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(capacity: usize) -> LruLayer {
        LruLayer::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn v(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let l1 = layer(3);
        l1.put("a", v("1"), None);
        l1.put("b", v("2"), None);
        l1.put("c", v("3"), None);

        // "a" becomes most recent, so "b" is now the eviction candidate
        assert!(l1.get("a").is_some());
        l1.put("d", v("4"), None);

        assert!(l1.get("b").is_none());
        assert_eq!(l1.keys(), vec!["d", "a", "c"]);

        l1.put("e", v("5"), None);
        assert!(l1.get("c").is_none());
        assert_eq!(l1.len(), 3);
    }

    #[tokio::test]
    async fn test_put_replaces_and_refreshes_recency() {
        let l1 = layer(2);
        l1.put("a", v("1"), None);
        l1.put("b", v("2"), None);
        l1.put("a", v("updated"), None);
        l1.put("c", v("3"), None);

        assert_eq!(l1.get("a").as_deref(), Some("updated"));
        assert!(l1.get("b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let l1 = layer(8);
        l1.put("short", v("s"), Some(Duration::from_secs(5)));
        l1.put("default", v("d"), None);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(l1.get("short").is_none());
        assert!(l1.get("default").is_some());

        tokio::time::advance(DEFAULT_L1_TTL).await;
        assert!(l1.get("default").is_none());
        assert!(l1.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_meta_tracks_age_and_idle() {
        let l1 = layer(4);
        l1.put("k", v("v"), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(10)).await;
        l1.get("k");
        tokio::time::advance(Duration::from_secs(5)).await;

        let meta = l1.meta("k").unwrap();
        assert_eq!(meta.age, Duration::from_secs(15));
        assert_eq!(meta.idle, Duration::from_secs(5));
        assert_eq!(meta.ttl_remaining, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_remove_prefix() {
        let l1 = layer(8);
        l1.put("core:/api/v1/entities/1:default", v("1"), None);
        l1.put("core:/api/v1/entities/2:default", v("2"), None);
        l1.put("core:/api/v1/mentions/1:default", v("3"), None);

        assert_eq!(l1.remove_prefix("core:/api/v1/entities/"), 2);
        assert_eq!(l1.len(), 1);
        assert!(l1.remove("core:/api/v1/mentions/1:default"));
        assert!(!l1.remove("core:/api/v1/mentions/1:default"));
    }

    #[test]
    fn test_concurrent_access() {
        let l1 = Arc::new(layer(64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let l1 = Arc::clone(&l1);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", (t * 200 + i) % 100);
                        l1.put(key.clone(), v("x"), None);
                        l1.get(&key);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert!(l1.len() <= 64);
    }
}
