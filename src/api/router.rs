use axum::{middleware, routing::get, Router};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::admin;
use super::gateway;
use super::health;
use super::middleware::{logging_middleware, metrics_middleware};
use super::state::AppState;

/// Create the full router with application state
///
/// Anything that is not a probe or an admin call falls through to the
/// gateway pipeline.
pub fn create_router_with_state(state: AppState) -> Router {
    let mut router = Router::new()
        // Probes are unauthenticated and never rate limited
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check));

    if state.admin_enabled() {
        router = router.nest("/admin", admin::create_admin_router());
    }

    router
        .fallback(gateway::proxy)
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
