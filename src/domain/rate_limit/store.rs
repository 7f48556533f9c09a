//! Storage contract for limiter state

use async_trait::async_trait;
use std::fmt::Debug;

use super::algorithm::{LimitPolicy, RateLimitDecision};
use super::tier::Algorithm;
use crate::domain::api_key::ApiKeyId;
use crate::domain::DomainError;

/// Where limiter state lives
///
/// `acquire` must be atomic per key: the read, the decision and the commit
/// happen as one step, so concurrent callers cannot both take the last slot.
#[async_trait]
pub trait RateLimitStore: Send + Sync + Debug {
    async fn acquire(
        &self,
        key: &str,
        policy: &LimitPolicy,
        now_ms: u64,
    ) -> Result<RateLimitDecision, DomainError>;

    /// Drop all state whose key starts with `prefix`. Returns how many entries went.
    async fn reset_prefix(&self, prefix: &str) -> Result<usize, DomainError>;

    /// Short name for logs and metrics
    fn name(&self) -> &'static str;
}

/// State key for one API key under one tier and algorithm
///
/// The key id comes first so a reset can drop every tier at once.
pub fn state_key(key_id: &ApiKeyId, tier: &str, algorithm: Algorithm) -> String {
    format!("{}:{}:{}", key_id, tier, algorithm)
}
