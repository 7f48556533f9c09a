//! Cache control admin endpoints

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::middleware::RequireAdmin;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::infrastructure::cache::CacheStats;

#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub prefix: String,
    pub l1_removed: usize,
    pub l2_removed: usize,
    pub removed: usize,
}

/// POST /admin/cache/invalidate
///
/// An empty prefix is rejected; it would flush the whole shared store.
pub async fn invalidate(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(request): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    if request.prefix.is_empty() {
        return Err(ApiError::bad_request("prefix must not be empty"));
    }

    let report = state.cache().invalidate(&request.prefix).await;
    info!(
        prefix = %request.prefix,
        l1_removed = report.l1_removed,
        l2_removed = report.l2_removed,
        "Cache invalidated"
    );

    Ok(Json(InvalidateResponse {
        removed: report.total(),
        l1_removed: report.l1_removed,
        l2_removed: report.l2_removed,
        prefix: request.prefix,
    }))
}

/// GET /admin/cache/stats
pub async fn stats(State(state): State<AppState>, _admin: RequireAdmin) -> Json<CacheStats> {
    Json(state.cache().stats())
}
