//! Admin API for key lifecycle and cache control
//!
//! Every handler requires [`RequireAdmin`](crate::api::middleware::RequireAdmin).

pub mod api_keys;
pub mod cache;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create admin API router
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        // API key lifecycle
        .route(
            "/keys",
            get(api_keys::list_api_keys).post(api_keys::create_api_key),
        )
        .route("/keys/{key_id}", get(api_keys::get_api_key))
        .route("/keys/{key_id}/revoke", post(api_keys::revoke_api_key))
        .route("/keys/{key_id}/reset-limits", post(api_keys::reset_limits))
        // Cache control
        .route("/cache/invalidate", post(cache::invalidate))
        .route("/cache/stats", get(cache::stats))
}
