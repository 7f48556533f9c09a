//! API Key repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::entity::{ApiKey, ApiKeyId};
use crate::domain::DomainError;

/// Repository trait for API key storage
///
/// There is no delete: revoked keys are retained for auditing.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync + Debug {
    /// Get an API key by its ID
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError>;

    /// Get an API key by its key prefix (for lookup during authentication)
    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Create a new API key
    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError>;

    /// Update an existing API key
    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError>;

    /// List all API keys, revoked ones included
    async fn list(&self) -> Result<Vec<ApiKey>, DomainError>;

    /// Record usage of an API key
    async fn record_usage(&self, id: &ApiKeyId, at: DateTime<Utc>) -> Result<(), DomainError>;
}
