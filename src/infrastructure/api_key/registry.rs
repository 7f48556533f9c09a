//! API key registry
//!
//! Issues, validates and revokes caller credentials.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository, OwnerId, Principal};
use crate::domain::gateway::AuthError;
use crate::domain::rate_limit::TierTable;
use crate::domain::DomainError;

use super::generator::{ApiKeyGenerator, GeneratedApiKey};

/// A newly issued key. `secret` is the only copy of the plaintext.
#[derive(Debug)]
pub struct IssuedApiKey {
    pub api_key: ApiKey,
    pub secret: String,
}

#[derive(Debug)]
pub struct ApiKeyRegistry {
    repository: Arc<dyn ApiKeyRepository>,
    generator: ApiKeyGenerator,
    tiers: Option<Arc<TierTable>>,
}

impl ApiKeyRegistry {
    pub fn new(repository: Arc<dyn ApiKeyRepository>, generator: ApiKeyGenerator) -> Self {
        Self {
            repository,
            generator,
            tiers: None,
        }
    }

    /// Reject issuance for tiers the table does not know
    pub fn with_tier_table(mut self, tiers: Arc<TierTable>) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub async fn issue(&self, owner_id: OwnerId, tier: &str) -> Result<IssuedApiKey, DomainError> {
        self.check_tier(tier)?;
        self.store(self.generator.generate(), owner_id, tier).await
    }

    /// Issue a key whose secret part is chosen by the caller
    pub async fn register_with_secret(
        &self,
        secret: &str,
        owner_id: OwnerId,
        tier: &str,
    ) -> Result<IssuedApiKey, DomainError> {
        self.check_tier(tier)?;
        let generated = self.generator.from_secret(secret)?;
        self.store(generated, owner_id, tier).await
    }

    async fn store(
        &self,
        generated: GeneratedApiKey,
        owner_id: OwnerId,
        tier: &str,
    ) -> Result<IssuedApiKey, DomainError> {
        let api_key = ApiKey::new(
            ApiKeyId::generate(),
            generated.hash,
            generated.prefix,
            owner_id,
            tier,
        );

        let created = self.repository.create(api_key).await?;

        info!(
            key_id = %created.id(),
            owner_id = %created.owner_id(),
            tier = %created.tier(),
            "API key issued"
        );

        Ok(IssuedApiKey {
            api_key: created,
            secret: generated.key,
        })
    }

    /// Authenticate a presented key
    ///
    /// Revocation is only reported once the secret has been proven, so a
    /// guessed prefix never learns whether a key was revoked.
    pub async fn validate(&self, presented: Option<&str>) -> Result<Principal, AuthError> {
        let presented = presented
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AuthError::MissingKey)?;

        let prefix = self
            .generator
            .lookup_prefix(presented)
            .ok_or(AuthError::InvalidKey)?;

        let api_key = match self.repository.get_by_prefix(prefix).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                debug!(prefix, "No API key for prefix");
                return Err(AuthError::InvalidKey);
            }
            Err(e) => {
                error!(error = %e, "API key lookup failed");
                return Err(AuthError::InvalidKey);
            }
        };

        if !self.generator.verify_key(presented, api_key.secret_hash()) {
            debug!(key_id = %api_key.id(), "API key hash mismatch");
            return Err(AuthError::InvalidKey);
        }

        if api_key.is_revoked() {
            debug!(key_id = %api_key.id(), "Revoked API key presented");
            return Err(AuthError::Revoked);
        }

        self.touch(api_key.id().clone());

        Ok(Principal::from(&api_key))
    }

    // last_used_at is bookkeeping; the request never waits on it
    fn touch(&self, id: ApiKeyId) {
        let repository = Arc::clone(&self.repository);
        let at = Utc::now();

        tokio::spawn(async move {
            if let Err(e) = repository.record_usage(&id, at).await {
                warn!(key_id = %id, error = %e, "Failed to record API key usage");
            }
        });
    }

    /// Revoke a key. Revoking twice is not an error.
    pub async fn revoke(&self, id: &ApiKeyId) -> Result<ApiKey, DomainError> {
        let mut api_key = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        if !api_key.revoke() {
            debug!(key_id = %id, "API key already revoked");
            return Ok(api_key);
        }

        let updated = self.repository.update(&api_key).await?;
        info!(key_id = %id, "API key revoked");

        Ok(updated)
    }

    pub async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        self.repository.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<ApiKey>, DomainError> {
        self.repository.list().await
    }

    fn check_tier(&self, tier: &str) -> Result<(), DomainError> {
        match &self.tiers {
            Some(table) if !table.contains(tier) => {
                Err(DomainError::validation(format!("Unknown tier: '{}'", tier)))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::api_key::{InMemoryApiKeyRepository, KeyEnvironment};
    use std::time::Duration;

    fn registry() -> ApiKeyRegistry {
        ApiKeyRegistry::new(
            Arc::new(InMemoryApiKeyRepository::new()),
            ApiKeyGenerator::new(KeyEnvironment::Test),
        )
        .with_tier_table(Arc::new(TierTable::default()))
    }

    fn owner(id: &str) -> OwnerId {
        OwnerId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let registry = registry();
        let issued = registry.issue(owner("user_1"), "basic").await.unwrap();

        assert!(issued.secret.starts_with("sk_test_"));

        let principal = registry.validate(Some(issued.secret.as_str())).await.unwrap();
        assert_eq!(principal.owner_id.as_str(), "user_1");
        assert_eq!(principal.tier, "basic");
        assert_eq!(&principal.key_id, issued.api_key.id());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let registry = registry();

        assert_eq!(registry.validate(None).await, Err(AuthError::MissingKey));
        assert_eq!(registry.validate(Some("   ")).await, Err(AuthError::MissingKey));
    }

    #[tokio::test]
    async fn test_invalid_keys() {
        let registry = registry();
        registry
            .register_with_secret("abcdefgh-one", owner("user_1"), "free")
            .await
            .unwrap();

        // Malformed
        assert_eq!(registry.validate(Some("garbage")).await, Err(AuthError::InvalidKey));
        // Wrong environment
        assert_eq!(
            registry.validate(Some("sk_live_abcdefgh-one")).await,
            Err(AuthError::InvalidKey)
        );
        // Unknown prefix
        assert_eq!(
            registry.validate(Some("sk_test_zzzzzzzz-one")).await,
            Err(AuthError::InvalidKey)
        );
        // Known prefix, wrong secret
        assert_eq!(
            registry.validate(Some("sk_test_abcdefgh-two")).await,
            Err(AuthError::InvalidKey)
        );
        assert!(registry.validate(Some("sk_test_abcdefgh-one")).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoked_key_is_rejected() {
        let registry = registry();
        let issued = registry.issue(owner("user_1"), "free").await.unwrap();
        assert!(registry.validate(Some(issued.secret.as_str())).await.is_ok());

        registry.revoke(issued.api_key.id()).await.unwrap();

        assert_eq!(
            registry.validate(Some(issued.secret.as_str())).await,
            Err(AuthError::Revoked)
        );
    }

    #[tokio::test]
    async fn test_revoked_is_only_reported_for_matching_secret() {
        let registry = registry();
        let issued = registry
            .register_with_secret("abcdefgh-one", owner("user_1"), "free")
            .await
            .unwrap();
        registry.revoke(issued.api_key.id()).await.unwrap();

        assert_eq!(
            registry.validate(Some("sk_test_abcdefgh-two")).await,
            Err(AuthError::InvalidKey)
        );
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let registry = registry();
        let issued = registry.issue(owner("user_1"), "free").await.unwrap();
        let id = issued.api_key.id().clone();

        let first = registry.revoke(&id).await.unwrap();
        let second = registry.revoke(&id).await.unwrap();

        assert!(second.is_revoked());
        assert_eq!(first.revoked_at(), second.revoked_at());
    }

    #[tokio::test]
    async fn test_revoke_unknown_key() {
        let registry = registry();
        let err = registry
            .revoke(&ApiKeyId::new("key-missing").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tier_rejected_on_issue() {
        let registry = registry();
        assert!(registry.issue(owner("user_1"), "platinum").await.is_err());
    }

    #[tokio::test]
    async fn test_validation_records_usage_in_background() {
        let registry = registry();
        let issued = registry.issue(owner("user_1"), "free").await.unwrap();
        let id = issued.api_key.id().clone();

        registry.validate(Some(issued.secret.as_str())).await.unwrap();

        let recorded = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let key = registry.get(&id).await.unwrap().unwrap();
                if key.last_used_at().is_some() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await;

        assert!(recorded.is_ok());
    }

    #[tokio::test]
    async fn test_list_keeps_revoked_keys() {
        let registry = registry();
        let a = registry.issue(owner("user_1"), "free").await.unwrap();
        registry.issue(owner("user_2"), "basic").await.unwrap();
        registry.revoke(a.api_key.id()).await.unwrap();

        let keys = registry.list().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.iter().filter(|k| k.is_revoked()).count(), 1);
    }
}
