use std::collections::HashMap;
use std::time::Duration;

use axum::http::Method;
use serde::Deserialize;

use crate::domain::rate_limit::{RateLimitTier, TierTable};
use crate::domain::{DomainError, Route, RouteTable};
use crate::infrastructure::api_key::KeyEnvironment;
use crate::infrastructure::backend::BackendTarget;
use crate::infrastructure::cache::{MultiLayerCacheConfig, SharedCacheBackend, SharedCacheSettings};
use crate::infrastructure::observability::ObservabilityConfig;

const DEFAULT_TARGET: &str = "core";

/// Application configuration
///
/// Every section is optional; an empty configuration runs a single
/// in-process instance in front of `http://localhost:8000`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub backends: HashMap<String, BackendTarget>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub key_environment: KeyEnvironment,
    /// Admin routes are only mounted when this is set
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default)]
    pub bootstrap_keys: Vec<BootstrapKey>,
}

/// A key registered at startup with a known secret
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapKey {
    pub secret: String,
    pub owner_id: String,
    pub tier: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStoreKind {
    #[default]
    InMemory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default)]
    pub store: RateLimitStoreKind,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_rate_limit_prefix")]
    pub key_prefix: String,
    /// Sub-windows per sliding window
    #[serde(default = "default_sliding_window_buckets")]
    pub sliding_window_buckets: u32,
    /// Bound on one store call before the in-process fallback decides
    #[serde(default = "default_rate_limit_timeout_ms")]
    pub timeout_ms: u64,
    /// Empty means the built-in tier set
    #[serde(default)]
    pub tiers: Vec<RateLimitTier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,
    #[serde(default = "default_l1_ttl_secs")]
    pub l1_ttl_secs: u64,
    #[serde(default)]
    pub l2: L2Settings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct L2Settings {
    #[serde(default)]
    pub backend: SharedCacheBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default = "default_l2_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_l2_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub pattern: String,
    pub methods: Vec<String>,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default)]
    pub cacheable: bool,
    #[serde(default)]
    pub tier_override: Option<String>,
    #[serde(default)]
    pub l1_ttl_secs: Option<u64>,
    #[serde(default)]
    pub l2_ttl_secs: Option<u64>,
}

fn default_rate_limit_prefix() -> String {
    "rl".to_string()
}

fn default_sliding_window_buckets() -> u32 {
    12
}

fn default_rate_limit_timeout_ms() -> u64 {
    50
}

fn default_l1_capacity() -> usize {
    10_000
}

fn default_l1_ttl_secs() -> u64 {
    100
}

fn default_l2_ttl_secs() -> u64 {
    3600
}

fn default_l2_timeout_ms() -> u64 {
    100
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            store: RateLimitStoreKind::default(),
            redis_url: None,
            key_prefix: default_rate_limit_prefix(),
            sliding_window_buckets: default_sliding_window_buckets(),
            timeout_ms: default_rate_limit_timeout_ms(),
            tiers: Vec::new(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_capacity: default_l1_capacity(),
            l1_ttl_secs: default_l1_ttl_secs(),
            l2: L2Settings::default(),
        }
    }
}

impl Default for L2Settings {
    fn default() -> Self {
        Self {
            backend: SharedCacheBackend::default(),
            redis_url: None,
            key_prefix: None,
            ttl_secs: default_l2_ttl_secs(),
            timeout_ms: default_l2_timeout_ms(),
            max_capacity: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn tier_table(&self) -> Result<TierTable, DomainError> {
        if self.rate_limit.tiers.is_empty() {
            return Ok(TierTable::default());
        }
        TierTable::new(self.rate_limit.tiers.clone())
    }

    /// Configured routes, or the stock set when none are given. Every
    /// route must point at a configured backend.
    pub fn route_table(&self) -> Result<RouteTable, DomainError> {
        let routes = if self.routes.is_empty() {
            RouteTable::default_routes(DEFAULT_TARGET)?
        } else {
            self.routes
                .iter()
                .map(RouteConfig::to_route)
                .collect::<Result<Vec<_>, _>>()?
        };

        let backends = self.backend_targets();
        if let Some(route) = routes.iter().find(|r| !backends.contains_key(r.target())) {
            return Err(DomainError::configuration(format!(
                "route '{}' points at unknown backend '{}'",
                route.pattern(),
                route.target()
            )));
        }

        Ok(RouteTable::new(routes))
    }

    /// Configured backends, or a single local `core` target
    pub fn backend_targets(&self) -> HashMap<String, BackendTarget> {
        if self.backends.is_empty() {
            return HashMap::from([(
                DEFAULT_TARGET.to_string(),
                BackendTarget::new("http://localhost:8000"),
            )]);
        }
        self.backends.clone()
    }

    pub fn multi_layer_cache_config(&self) -> MultiLayerCacheConfig {
        MultiLayerCacheConfig {
            l1_capacity: self.cache.l1_capacity,
            l1_ttl: Duration::from_secs(self.cache.l1_ttl_secs),
            l2_ttl: Duration::from_secs(self.cache.l2.ttl_secs),
            l2_timeout: Duration::from_millis(self.cache.l2.timeout_ms),
        }
    }

    pub fn shared_cache_settings(&self) -> SharedCacheSettings {
        SharedCacheSettings {
            backend: self.cache.l2.backend,
            redis_url: self.cache.l2.redis_url.clone(),
            key_prefix: self.cache.l2.key_prefix.clone(),
            max_capacity: self.cache.l2.max_capacity,
        }
    }
}

impl RouteConfig {
    fn to_route(&self) -> Result<Route, DomainError> {
        let methods = self
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_uppercase().as_bytes()).map_err(|_| {
                    DomainError::configuration(format!(
                        "route '{}' has invalid method '{}'",
                        self.pattern, m
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut route = Route::new(&self.pattern, methods, self.target.clone())?
            .cacheable(self.cacheable)
            .with_ttls(
                self.l1_ttl_secs.map(Duration::from_secs),
                self.l2_ttl_secs.map(Duration::from_secs),
            );

        if let Some(tier) = &self.tier_override {
            route = route.with_tier_override(tier.clone());
        }

        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rate_limit::Algorithm;
    use config::{Config, File, FileFormat};

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.gateway.key_environment, KeyEnvironment::Live);
        assert!(config.gateway.admin_token.is_none());
        assert_eq!(config.rate_limit.store, RateLimitStoreKind::InMemory);
        assert_eq!(config.rate_limit.sliding_window_buckets, 12);
        assert_eq!(config.rate_limit.timeout_ms, 50);
        assert_eq!(config.cache.l1_ttl_secs, 100);
        assert_eq!(config.cache.l2.ttl_secs, 3600);

        let tiers = config.tier_table().unwrap();
        assert!(tiers.contains("enterprise"));
        assert_eq!(config.route_table().unwrap().len(), 3);
        assert!(config.backend_targets().contains_key("core"));
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [gateway]
            key_environment = "test"
            admin_token = "s3cret"

            [[gateway.bootstrap_keys]]
            secret = "sk_test_bootstrapkey01"
            owner_id = "ops"
            tier = "enterprise"

            [rate_limit]
            store = "redis"
            redis_url = "redis://cache:6379"
            timeout_ms = 20

            [[rate_limit.tiers]]
            name = "starter"
            requests_per_hour = 50
            requests_per_minute = 5
            algorithm = "fixed_window"

            [cache]
            l1_capacity = 64

            [cache.l2]
            backend = "redis"
            redis_url = "redis://cache:6379"
            timeout_ms = 25

            [backends.search]
            base_url = "http://search:9000"
            timeout_ms = 2000

            [[routes]]
            pattern = "/search/{index}/*"
            methods = ["get", "POST"]
            target = "search"
            cacheable = true
            tier_override = "starter"
            l1_ttl_secs = 5
            "#,
        );

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.gateway.key_environment, KeyEnvironment::Test);
        assert_eq!(config.gateway.bootstrap_keys.len(), 1);
        assert_eq!(config.rate_limit.store, RateLimitStoreKind::Redis);
        assert_eq!(config.rate_limit.timeout_ms, 20);

        let tiers = config.tier_table().unwrap();
        assert_eq!(tiers.lowest().algorithm, Algorithm::FixedWindow);

        let cache = config.multi_layer_cache_config();
        assert_eq!(cache.l1_capacity, 64);
        assert_eq!(cache.l2_timeout, Duration::from_millis(25));
        assert_eq!(config.shared_cache_settings().backend, SharedCacheBackend::Redis);

        let routes = config.route_table().unwrap();
        let matched = routes.match_route("/search/docs/q", &Method::POST).unwrap();
        assert_eq!(matched.route.target(), "search");
        assert_eq!(matched.route.tier_override(), Some("starter"));
        assert_eq!(matched.route.l1_ttl(), Some(Duration::from_secs(5)));
        assert_eq!(config.backend_targets()["search"].timeout_ms, 2000);
    }

    #[test]
    fn test_shipped_default_file_matches_builtin_defaults() {
        let config = parse(include_str!("../../config/default.toml"));

        assert_eq!(config.tier_table().unwrap().iter().count(), 4);
        assert_eq!(config.route_table().unwrap().len(), 3);
        assert_eq!(config.backend_targets()["core"].base_url, "http://localhost:8000");
        assert!(config.observability.metrics.enabled);
    }

    #[test]
    fn test_route_to_unknown_backend_rejected() {
        let config = parse(
            r#"
            [[routes]]
            pattern = "/x/*"
            methods = ["GET"]
            target = "missing"
            "#,
        );

        assert!(config.route_table().is_err());
    }

    #[test]
    fn test_invalid_method_rejected() {
        let config = parse(
            r#"
            [[routes]]
            pattern = "/x/*"
            methods = ["FETCH ME"]
            "#,
        );

        assert!(config.route_table().is_err());
    }
}
