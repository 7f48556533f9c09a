//! In-process rate limit state
//!
//! One mutex per state key inside a sharded map: callers on different keys
//! only meet for the shard lookup, never for the algorithm step.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::domain::rate_limit::{LimitPolicy, LimiterState, RateLimitDecision, RateLimitStore};
use crate::domain::DomainError;

#[derive(Debug)]
struct Slot {
    state: LimiterState,
    last_seen_ms: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    slots: DashMap<String, Arc<Mutex<Slot>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str, policy: &LimitPolicy, now_ms: u64) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }

        let slot = self.slots.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(Slot {
                state: LimiterState::new(policy, now_ms),
                last_seen_ms: now_ms,
            }))
        });
        Arc::clone(slot.value())
    }

    /// Synchronous acquire; the lock is never held across an await
    pub fn acquire_now(&self, key: &str, policy: &LimitPolicy, now_ms: u64) -> RateLimitDecision {
        let slot = self.slot(key, policy, now_ms);
        let mut slot = slot.lock();

        slot.last_seen_ms = slot.last_seen_ms.max(now_ms);
        slot.state.acquire(policy, now_ms)
    }

    /// Drop state untouched for longer than `max_idle_ms`
    pub fn purge_idle(&self, now_ms: u64, max_idle_ms: u64) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now_ms.saturating_sub(slot.lock().last_seen_ms) <= max_idle_ms);
        before.saturating_sub(self.slots.len())
    }

    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let before = self.slots.len();
        self.slots.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.slots.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn acquire(
        &self,
        key: &str,
        policy: &LimitPolicy,
        now_ms: u64,
    ) -> Result<RateLimitDecision, DomainError> {
        Ok(self.acquire_now(key, policy, now_ms))
    }

    async fn reset_prefix(&self, prefix: &str) -> Result<usize, DomainError> {
        Ok(self.remove_prefix(prefix))
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rate_limit::{Algorithm, MINUTE_MS};

    fn policy(algorithm: Algorithm, per_minute: u32) -> LimitPolicy {
        LimitPolicy {
            algorithm,
            per_hour: 10_000,
            per_minute,
            sub_windows: 12,
        }
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        let p = policy(Algorithm::FixedWindow, 1);

        assert!(store.acquire("a:free:fixed_window", &p, 0).await.unwrap().allowed);
        assert!(!store.acquire("a:free:fixed_window", &p, 0).await.unwrap().allowed);
        assert!(store.acquire("b:free:fixed_window", &p, 0).await.unwrap().allowed);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_prefix() {
        let store = InMemoryRateLimitStore::new();
        let p = policy(Algorithm::FixedWindow, 1);

        store.acquire("key-1:free:fixed_window", &p, 0).await.unwrap();
        store.acquire("key-1:basic:fixed_window", &p, 0).await.unwrap();
        store.acquire("key-2:free:fixed_window", &p, 0).await.unwrap();

        assert_eq!(store.reset_prefix("key-1:").await.unwrap(), 2);
        assert!(store.acquire("key-1:free:fixed_window", &p, 0).await.unwrap().allowed);
    }

    #[test]
    fn test_purge_idle() {
        let store = InMemoryRateLimitStore::new();
        let p = policy(Algorithm::TokenBucket, 5);

        store.acquire_now("old", &p, 0);
        store.acquire_now("fresh", &p, 10 * MINUTE_MS);

        assert_eq!(store.purge_idle(10 * MINUTE_MS, 5 * MINUTE_MS), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_limit() {
        for algorithm in [
            Algorithm::FixedWindow,
            Algorithm::SlidingWindow,
            Algorithm::TokenBucket,
            Algorithm::LeakyBucket,
        ] {
            let store = Arc::new(InMemoryRateLimitStore::new());
            let p = policy(algorithm, 20);

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    std::thread::spawn(move || {
                        (0..25)
                            .filter(|_| store.acquire_now("shared", &p, 1_000).allowed)
                            .count()
                    })
                })
                .collect();

            let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
            assert_eq!(admitted, 20, "algorithm {}", algorithm);
        }
    }
}
