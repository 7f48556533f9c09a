//! Shared (L2) cache contract

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DomainError;

/// A cache shared between gateway instances
///
/// Values are opaque strings so the trait stays dyn-compatible; the
/// multi-layer cache does the (de)serialization.
#[async_trait]
pub trait SharedCache: Send + Sync + Debug {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Delete every key starting with `prefix`, returning how many went
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, DomainError>;

    /// Approximate entry count
    async fn size(&self) -> Result<usize, DomainError>;

    /// Round-trip check used by readiness probes
    async fn ping(&self) -> Result<(), DomainError>;

    /// Short name for logs and metrics
    fn name(&self) -> &'static str;
}
