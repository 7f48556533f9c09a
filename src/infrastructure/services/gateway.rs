//! Gateway request pipeline
//!
//! One pass per request, in a fixed order: authenticate, admit, route,
//! consult the cache, forward. Each of the first three stages can end the
//! request; later stages never run before earlier ones have passed.

use std::sync::Arc;

use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::Method;
use tracing::{debug, instrument, warn};

use crate::domain::cache::{CacheKey, CacheKeyParams};
use crate::domain::{
    Backend, BackendRequest, BackendResponse, GatewayError, Principal, RateLimitError,
    Route, RouteTable,
};
use crate::infrastructure::api_key::ApiKeyRegistry;
use crate::infrastructure::cache::{CacheStatus, CacheTtl, MultiLayerCache};
use crate::infrastructure::observability::record_gateway_request;
use crate::infrastructure::rate_limit::{RateLimitOutcome, RateLimiter};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const OWNER_ID_HEADER: &str = "x-owner-id";
pub const USER_TIER_HEADER: &str = "x-user-tier";

/// Quota state reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaInfo {
    pub tier: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_seconds: u64,
    pub retry_after: Option<u64>,
}

impl From<&RateLimitOutcome> for QuotaInfo {
    fn from(outcome: &RateLimitOutcome) -> Self {
        Self {
            tier: outcome.tier.name.clone(),
            limit: outcome.decision.limit,
            remaining: outcome.decision.remaining,
            reset_in_seconds: outcome.decision.reset_in_seconds,
            retry_after: outcome.decision.retry_after,
        }
    }
}

/// Everything the HTTP layer needs to render a reply
#[derive(Debug)]
pub struct GatewayOutcome {
    pub result: Result<BackendResponse, GatewayError>,
    /// Absent when the request never got past authentication
    pub quota: Option<QuotaInfo>,
    /// Present only when the route was eligible for caching
    pub cache: Option<CacheStatus>,
}

impl GatewayOutcome {
    fn failed(error: impl Into<GatewayError>, quota: Option<QuotaInfo>) -> Self {
        Self {
            result: Err(error.into()),
            quota,
            cache: None,
        }
    }

    pub fn status_code(&self) -> u16 {
        match &self.result {
            Ok(response) => response.status,
            Err(e) => e.status_code(),
        }
    }

    fn metric_label(&self) -> &'static str {
        match &self.result {
            Ok(_) if self.cache == Some(CacheStatus::Hit) => "cache_hit",
            Ok(_) => "forwarded",
            Err(GatewayError::Auth(_)) => "unauthorized",
            Err(GatewayError::RateLimit(_)) => "rate_limited",
            Err(GatewayError::Routing(_)) => "no_route",
            Err(GatewayError::Backend(_)) => "backend_error",
        }
    }
}

/// Pull the presented key from `Authorization: Bearer` or `X-API-Key`
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });

    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })
}

#[derive(Debug)]
pub struct GatewayService {
    registry: Arc<ApiKeyRegistry>,
    limiter: Arc<RateLimiter>,
    routes: Arc<RouteTable>,
    cache: Arc<MultiLayerCache>,
    backend: Arc<dyn Backend>,
}

impl GatewayService {
    pub fn new(
        registry: Arc<ApiKeyRegistry>,
        limiter: Arc<RateLimiter>,
        routes: Arc<RouteTable>,
        cache: Arc<MultiLayerCache>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            registry,
            limiter,
            routes,
            cache,
            backend,
        }
    }

    pub fn registry(&self) -> &Arc<ApiKeyRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<MultiLayerCache> {
        &self.cache
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn handle(&self, request: BackendRequest) -> GatewayOutcome {
        let outcome = self.run(request).await;

        let tier = outcome.quota.as_ref().map(|q| q.tier.as_str());
        record_gateway_request(outcome.metric_label(), tier);

        outcome
    }

    async fn run(&self, request: BackendRequest) -> GatewayOutcome {
        let principal = match self.registry.validate(extract_api_key(&request.headers)).await {
            Ok(principal) => principal,
            Err(e) => {
                debug!(code = e.code(), "Authentication failed");
                return GatewayOutcome::failed(e, None);
            }
        };

        let tier_name = self
            .routes
            .tier_override_for(&request.path, &request.method)
            .unwrap_or(principal.tier.as_str());
        let admission = self.limiter.check(&principal.key_id, tier_name).await;
        let quota = QuotaInfo::from(&admission);

        if !admission.decision.allowed {
            let retry_after = admission.decision.retry_after.unwrap_or(1);
            return GatewayOutcome::failed(RateLimitError::QuotaExceeded { retry_after }, Some(quota));
        }

        let matched = match self.routes.match_route(&request.path, &request.method) {
            Ok(matched) => matched,
            Err(e) => return GatewayOutcome::failed(e, Some(quota)),
        };
        let route = matched.route;

        let upstream = upstream_request(request, &principal, &quota.tier);

        if route.is_cacheable() && is_idempotent(&upstream.method) {
            return self.cached_forward(route, upstream, quota).await;
        }

        GatewayOutcome {
            result: self.forward(route, upstream).await,
            quota: Some(quota),
            cache: None,
        }
    }

    async fn forward(
        &self,
        route: &Route,
        request: BackendRequest,
    ) -> Result<BackendResponse, GatewayError> {
        self.backend
            .forward(route.target(), request)
            .await
            .map_err(GatewayError::from)
    }

    async fn cached_forward(
        &self,
        route: &Route,
        request: BackendRequest,
        quota: QuotaInfo,
    ) -> GatewayOutcome {
        let key = response_cache_key(route.target(), &request);
        let defaults = self.cache.default_ttl();
        let ttl = CacheTtl::new(
            route.l1_ttl().unwrap_or(defaults.l1),
            route.l2_ttl().unwrap_or(defaults.l2),
        );

        // HEAD may be answered from a cached GET but never populates the cache
        if request.method == Method::HEAD {
            if let Some(hit) = self.cache.get::<BackendResponse>(key.as_str()).await {
                return GatewayOutcome {
                    result: Ok(hit),
                    quota: Some(quota),
                    cache: Some(CacheStatus::Hit),
                };
            }

            return GatewayOutcome {
                result: self.forward(route, request).await,
                quota: Some(quota),
                cache: Some(CacheStatus::Miss),
            };
        }

        let result = self
            .cache
            .with_cache_when(
                key.as_str(),
                ttl,
                BackendResponse::is_cacheable,
                || self.forward(route, request),
            )
            .await;

        match result {
            Ok((response, status)) => {
                debug!(key = %key, cache = status.as_str(), "Cacheable request served");
                GatewayOutcome {
                    result: Ok(response),
                    quota: Some(quota),
                    cache: Some(status),
                }
            }
            Err(e) => GatewayOutcome {
                result: Err(e),
                quota: Some(quota),
                cache: Some(CacheStatus::Miss),
            },
        }
    }
}

fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// `{target}:{path}:{variant}`, where the variant hashes the query string
pub fn response_cache_key(target: &str, request: &BackendRequest) -> CacheKey {
    let params = CacheKeyParams::from_query(request.query.as_deref());
    CacheKey::resource(target, &request.path, params.variant())
}

/// Strip caller credentials and attach the resolved identity
fn upstream_request(mut request: BackendRequest, principal: &Principal, tier: &str) -> BackendRequest {
    request.headers.remove(header::AUTHORIZATION);
    request.headers.remove(API_KEY_HEADER);

    match HeaderValue::from_str(principal.owner_id.as_str()) {
        Ok(value) => {
            request.headers.insert(OWNER_ID_HEADER, value);
        }
        Err(e) => warn!(owner_id = %principal.owner_id, error = %e, "Owner id is not a valid header value"),
    }
    if let Ok(value) = HeaderValue::from_str(tier) {
        request.headers.insert(USER_TIER_HEADER, value);
    }

    request
}
