//! In-memory API key repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<String, ApiKey>,
    // lookup prefix -> key id
    prefix_index: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct InMemoryApiKeyRepository {
    inner: RwLock<Inner>,
}

impl InMemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        Ok(self.inner.read().await.keys.get(id.as_str()).cloned())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, DomainError> {
        let inner = self.inner.read().await;

        Ok(inner
            .prefix_index
            .get(prefix)
            .and_then(|id| inner.keys.get(id))
            .cloned())
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let mut inner = self.inner.write().await;
        let id = api_key.id().as_str().to_string();
        let prefix = api_key.key_prefix().to_string();

        if inner.keys.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "API key with ID '{}' already exists",
                id
            )));
        }

        if inner.prefix_index.contains_key(&prefix) {
            return Err(DomainError::conflict(format!(
                "API key with prefix '{}' already exists",
                prefix
            )));
        }

        inner.prefix_index.insert(prefix, id.clone());
        inner.keys.insert(id, api_key.clone());

        Ok(api_key)
    }

    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError> {
        let mut inner = self.inner.write().await;

        match inner.keys.get_mut(api_key.id().as_str()) {
            Some(existing) => {
                *existing = api_key.clone();
                Ok(api_key.clone())
            }
            None => Err(DomainError::not_found(format!(
                "API key '{}' not found",
                api_key.id()
            ))),
        }
    }

    async fn list(&self) -> Result<Vec<ApiKey>, DomainError> {
        let inner = self.inner.read().await;
        let mut keys: Vec<ApiKey> = inner.keys.values().cloned().collect();
        keys.sort_by_key(|k| k.issued_at());
        Ok(keys)
    }

    async fn record_usage(&self, id: &ApiKeyId, at: DateTime<Utc>) -> Result<(), DomainError> {
        let mut inner = self.inner.write().await;

        match inner.keys.get_mut(id.as_str()) {
            Some(key) => {
                key.record_usage(at);
                Ok(())
            }
            None => Err(DomainError::not_found(format!("API key '{}' not found", id))),
        }
    }
}
