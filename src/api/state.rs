//! Application state shared by every handler

use std::sync::Arc;

use crate::infrastructure::api_key::ApiKeyRegistry;
use crate::infrastructure::cache::MultiLayerCache;
use crate::infrastructure::rate_limit::RateLimiter;
use crate::infrastructure::services::GatewayService;

#[derive(Clone, Debug)]
pub struct AppState {
    pub gateway: Arc<GatewayService>,
    /// Token required by the admin API; `None` leaves it unmounted
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(gateway: Arc<GatewayService>) -> Self {
        Self {
            gateway,
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: impl Into<Arc<str>>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    pub fn admin_enabled(&self) -> bool {
        self.admin_token.is_some()
    }

    pub fn registry(&self) -> &ApiKeyRegistry {
        self.gateway.registry()
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.gateway.limiter()
    }

    pub fn cache(&self) -> &MultiLayerCache {
        self.gateway.cache()
    }
}
