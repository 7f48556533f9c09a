//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, BootstrapKey, CacheSettings, GatewaySettings, L2Settings, LogFormat, LoggingConfig,
    RateLimitSettings, RateLimitStoreKind, RouteConfig, ServerConfig,
};
