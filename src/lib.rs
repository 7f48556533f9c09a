//! Edge Gateway
//!
//! An authenticating reverse proxy that sits in front of internal services:
//! - API key issuance, validation and revocation
//! - Tiered rate limiting (fixed window, sliding window, token bucket, leaky bucket)
//!   over an in-process or Redis store
//! - Two-level response caching (in-process LRU plus a shared L2)
//! - Pattern-based routing to named backend targets

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api::state::AppState;
use config::RateLimitStoreKind;
use domain::{
    api_key::OwnerId,
    rate_limit::{SystemClock, TierTable},
};
use infrastructure::{
    api_key::{ApiKeyGenerator, ApiKeyRegistry, InMemoryApiKeyRepository},
    backend::HttpBackend,
    cache::{create_shared_cache, MultiLayerCache},
    rate_limit::{RateLimiter, RedisRateLimitStore, RedisRateLimitStoreConfig},
    services::GatewayService,
};
use tracing::{info, warn};

/// Create the application state from the default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let tiers = Arc::new(config.tier_table().context("invalid rate limit tiers")?);

    let registry = Arc::new(
        ApiKeyRegistry::new(
            Arc::new(InMemoryApiKeyRepository::new()),
            ApiKeyGenerator::new(config.gateway.key_environment),
        )
        .with_tier_table(tiers.clone()),
    );
    register_bootstrap_keys(&registry, config).await?;

    let limiter = Arc::new(create_rate_limiter(config, tiers).await?);
    info!(store = limiter.store_name(), "Rate limiter initialized");

    let shared = create_shared_cache(&config.shared_cache_settings())
        .await
        .context("failed to create shared cache")?;
    let cache = Arc::new(MultiLayerCache::new(config.multi_layer_cache_config(), shared));
    info!(
        l1_capacity = config.cache.l1_capacity,
        l2 = cache.l2_name().unwrap_or("disabled"),
        "Response cache initialized"
    );

    let backend = Arc::new(
        HttpBackend::new(config.backend_targets()).context("invalid backend configuration")?,
    );
    let routes = Arc::new(config.route_table().context("invalid route configuration")?);
    info!(routes = routes.len(), "Route table loaded");

    let gateway = Arc::new(GatewayService::new(registry, limiter, routes, cache, backend));

    let mut state = AppState::new(gateway);
    match &config.gateway.admin_token {
        Some(token) if !token.is_empty() => {
            state = state.with_admin_token(token.as_str());
        }
        _ => warn!("No admin token configured; admin API disabled"),
    }

    Ok(state)
}

async fn create_rate_limiter(
    config: &AppConfig,
    tiers: Arc<TierTable>,
) -> anyhow::Result<RateLimiter> {
    let settings = &config.rate_limit;
    let clock = Arc::new(SystemClock);

    let limiter = match settings.store {
        // The in-process map doubles as the fallback, so the idle sweep covers it
        RateLimitStoreKind::InMemory => RateLimiter::in_memory(tiers, clock),
        RateLimitStoreKind::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .context("rate_limit.redis_url is required for the redis store")?;

            let store = RedisRateLimitStore::connect(
                RedisRateLimitStoreConfig::new(url).with_key_prefix(settings.key_prefix.as_str()),
            )
            .await
            .context("failed to connect rate limit store")?;

            RateLimiter::new(tiers, Arc::new(store), clock)
        }
    };

    Ok(limiter
        .with_sub_windows(settings.sliding_window_buckets)
        .with_store_timeout(Duration::from_millis(settings.timeout_ms)))
}

async fn register_bootstrap_keys(
    registry: &ApiKeyRegistry,
    config: &AppConfig,
) -> anyhow::Result<()> {
    for key in &config.gateway.bootstrap_keys {
        let owner_id = OwnerId::new(key.owner_id.as_str())
            .with_context(|| format!("invalid bootstrap owner '{}'", key.owner_id))?;

        let issued = registry
            .register_with_secret(&key.secret, owner_id, &key.tier)
            .await
            .with_context(|| format!("failed to register bootstrap key for '{}'", key.owner_id))?;

        info!(
            key_id = %issued.api_key.id(),
            key_prefix = issued.api_key.key_prefix(),
            tier = issued.api_key.tier(),
            "Bootstrap API key registered"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapKey;
    use crate::infrastructure::api_key::KeyEnvironment;

    #[tokio::test]
    async fn test_default_state() {
        let state = create_app_state().await.unwrap();

        assert!(!state.admin_enabled());
        assert_eq!(state.limiter().store_name(), "in_memory");
        assert_eq!(state.cache().l2_name(), Some("in_memory"));
        assert!(state.registry().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_limiter_tracks_state_in_swept_map() {
        let state = create_app_state().await.unwrap();
        let id = crate::domain::api_key::ApiKeyId::new("key-wiring").unwrap();

        state.limiter().check(&id, "free").await;

        assert_eq!(state.limiter().in_process_entries(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_keys_are_usable() {
        let mut config = AppConfig::default();
        config.gateway.key_environment = KeyEnvironment::Test;
        config.gateway.admin_token = Some("root".to_string());
        config.gateway.bootstrap_keys = vec![BootstrapKey {
            secret: "bootstrapsecret0001".to_string(),
            owner_id: "ops".to_string(),
            tier: "enterprise".to_string(),
        }];

        let state = create_app_state_with_config(&config).await.unwrap();

        assert!(state.admin_enabled());
        let principal = state
            .registry()
            .validate(Some("sk_test_bootstrapsecret0001"))
            .await
            .unwrap();
        assert_eq!(principal.tier, "enterprise");
    }

    #[tokio::test]
    async fn test_bootstrap_key_with_unknown_tier_fails() {
        let mut config = AppConfig::default();
        config.gateway.bootstrap_keys = vec![BootstrapKey {
            secret: "bootstrapsecret0001".to_string(),
            owner_id: "ops".to_string(),
            tier: "platinum".to_string(),
        }];

        assert!(create_app_state_with_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_redis_store_requires_url() {
        let mut config = AppConfig::default();
        config.rate_limit.store = RateLimitStoreKind::Redis;

        let err = create_app_state_with_config(&config).await.unwrap_err();
        assert!(err.to_string().contains("redis_url"));
    }
}
