//! Rate limiter service
//!
//! Resolves the tier, derives the policy and state key, and runs the
//! algorithm against the configured store. If the store fails the decision
//! is taken against in-process state instead; the limiter never admits
//! without running an algorithm.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::api_key::ApiKeyId;
use crate::domain::rate_limit::{
    state_key, Clock, LimitPolicy, RateLimitDecision, RateLimitStore, RateLimitTier, TierTable,
    HOUR_MS, MINUTE_MS,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{
    record_rate_limit_decision, record_rate_limit_store_error,
};

use super::in_memory::InMemoryRateLimitStore;

const DEFAULT_SUB_WINDOWS: u32 = 12;
const CLEANUP_INTERVAL_MS: u64 = 5 * MINUTE_MS;
const MAX_IDLE_MS: u64 = 2 * HOUR_MS;
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(50);

/// A decision together with the tier it was taken under
#[derive(Debug, Clone)]
pub struct RateLimitOutcome {
    pub tier: RateLimitTier,
    pub decision: RateLimitDecision,
}

#[derive(Debug)]
pub struct RateLimiter {
    tiers: Arc<TierTable>,
    store: Arc<dyn RateLimitStore>,
    fallback: Arc<InMemoryRateLimitStore>,
    clock: Arc<dyn Clock>,
    sub_windows: u32,
    store_timeout: Duration,
    last_cleanup_ms: AtomicU64,
    // true when `store` and `fallback` are the same in-process map
    fallback_is_primary: bool,
}

impl RateLimiter {
    pub fn new(tiers: Arc<TierTable>, store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();

        Self {
            tiers,
            store,
            fallback: Arc::new(InMemoryRateLimitStore::new()),
            clock,
            sub_windows: DEFAULT_SUB_WINDOWS,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            last_cleanup_ms: AtomicU64::new(now),
            fallback_is_primary: false,
        }
    }

    /// Limiter whose primary store is in-process
    pub fn in_memory(tiers: Arc<TierTable>, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let mut limiter = Self::new(tiers, store.clone(), clock);
        limiter.fallback = store;
        limiter.fallback_is_primary = true;
        limiter
    }

    pub fn with_sub_windows(mut self, sub_windows: u32) -> Self {
        self.sub_windows = sub_windows.max(1);
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Decide one request for `key_id` under `tier_name`
    pub async fn check(&self, key_id: &ApiKeyId, tier_name: &str) -> RateLimitOutcome {
        let tier = self.tiers.resolve(tier_name);
        if tier.name != tier_name {
            debug!(requested = tier_name, resolved = %tier.name, "Unknown tier, using lowest");
        }

        let policy = LimitPolicy::from_tier(tier, self.sub_windows);
        let key = state_key(key_id, &tier.name, tier.algorithm);
        let now = self.clock.now_millis();

        self.maybe_cleanup(now);

        let acquired = tokio::time::timeout(self.store_timeout, self.store.acquire(&key, &policy, now))
            .await
            .unwrap_or_else(|_| {
                Err(DomainError::storage(format!(
                    "no reply within {}ms",
                    self.store_timeout.as_millis()
                )))
            });

        let decision = match acquired {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    store = self.store.name(),
                    error = %e,
                    "Rate limit store unavailable, deciding on in-process state"
                );
                record_rate_limit_store_error(self.store.name());
                self.fallback.acquire_now(&key, &policy, now)
            }
        };

        record_rate_limit_decision(&tier.name, tier.algorithm.as_str(), decision.allowed);

        if !decision.allowed {
            debug!(
                key_id = %key_id,
                tier = %tier.name,
                algorithm = %tier.algorithm,
                retry_after = ?decision.retry_after,
                "Request rejected by rate limiter"
            );
        }

        RateLimitOutcome {
            tier: tier.clone(),
            decision,
        }
    }

    /// Forget all limiter state for a key, across every tier
    pub async fn reset(&self, key_id: &ApiKeyId) -> Result<usize, DomainError> {
        let prefix = format!("{}:", key_id);

        let mut removed = self.store.reset_prefix(&prefix).await?;
        if !self.fallback_is_primary {
            removed += self.fallback.remove_prefix(&prefix);
        }

        info!(key_id = %key_id, removed, "Rate limit state reset");
        Ok(removed)
    }

    /// Keys tracked by the in-process map that the idle sweep covers
    pub fn in_process_entries(&self) -> usize {
        self.fallback.len()
    }

    // One caller per interval wins the CAS and sweeps idle in-process state
    fn maybe_cleanup(&self, now: u64) {
        let last = self.last_cleanup_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < CLEANUP_INTERVAL_MS {
            return;
        }

        if self
            .last_cleanup_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let purged = self.fallback.purge_idle(now, MAX_IDLE_MS);
            if purged > 0 {
                debug!(purged, "Purged idle rate limit state");
            }
        }
    }
}
