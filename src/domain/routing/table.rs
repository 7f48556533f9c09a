//! Route definitions and the ordered route table

use std::time::Duration;

use axum::http::Method;

use super::pattern::{PathParams, RoutePattern};
use crate::domain::gateway::RoutingError;
use crate::domain::DomainError;

/// A path pattern bound to a backend target
#[derive(Debug, Clone)]
pub struct Route {
    pattern: RoutePattern,
    methods: Vec<Method>,
    target: String,
    tier_override: Option<String>,
    cacheable: bool,
    l1_ttl: Option<Duration>,
    l2_ttl: Option<Duration>,
}

impl Route {
    pub fn new(
        pattern: &str,
        methods: Vec<Method>,
        target: impl Into<String>,
    ) -> Result<Self, DomainError> {
        if methods.is_empty() {
            return Err(DomainError::validation(format!(
                "route '{}' must allow at least one method",
                pattern
            )));
        }

        Ok(Self {
            pattern: RoutePattern::parse(pattern)?,
            methods,
            target: target.into(),
            tier_override: None,
            cacheable: false,
            l1_ttl: None,
            l2_ttl: None,
        })
    }

    pub fn with_tier_override(mut self, tier: impl Into<String>) -> Self {
        self.tier_override = Some(tier.into());
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn with_ttls(mut self, l1: Option<Duration>, l2: Option<Duration>) -> Self {
        self.l1_ttl = l1;
        self.l2_ttl = l2;
        self
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn tier_override(&self) -> Option<&str> {
        self.tier_override.as_deref()
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn l1_ttl(&self) -> Option<Duration> {
        self.l1_ttl
    }

    pub fn l2_ttl(&self) -> Option<Duration> {
        self.l2_ttl
    }

    /// HEAD is accepted wherever GET is
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method) || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }
}

/// A matched route plus its captured path parameters
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: PathParams,
}

/// Ordered route list, built once at startup
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// First route whose pattern and method both match
    pub fn match_route(&self, path: &str, method: &Method) -> Result<RouteMatch<'_>, RoutingError> {
        self.routes
            .iter()
            .filter(|route| route.allows(method))
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| RouteMatch { route, params })
            })
            .ok_or(RoutingError::NoMatch)
    }

    /// Tier override of the route this request would take, if any
    pub fn tier_override_for(&self, path: &str, method: &Method) -> Option<&str> {
        self.match_route(path, method)
            .ok()
            .and_then(|m| m.route.tier_override())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The stock route set, all pointed at one target
    pub fn default_routes(target: &str) -> Result<Vec<Route>, DomainError> {
        Ok(vec![
            Route::new(
                "/api/v1/entities/*",
                vec![Method::GET, Method::POST, Method::PUT, Method::DELETE],
                target,
            )?
            .cacheable(true),
            Route::new("/api/v1/mentions/*", vec![Method::GET, Method::POST], target)?
                .cacheable(true),
            Route::new("/api/v1/analytics/*", vec![Method::GET], target)?
                .cacheable(true)
                .with_tier_override("professional"),
        ])
    }
}
