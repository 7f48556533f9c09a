//! API key management admin endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::middleware::RequireAdmin;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::api_key::{ApiKey, ApiKeyId, OwnerId};
use crate::domain::DomainError;

/// Request to issue a new API key
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub owner_id: String,
    pub tier: String,
}

/// API key response for admin API. Never carries the hash.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub key_prefix: String,
    pub owner_id: String,
    pub tier: String,
    pub issued_at: String,
    pub last_used_at: Option<String>,
    pub revoked: bool,
    pub revoked_at: Option<String>,
}

impl From<&ApiKey> for ApiKeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id().as_str().to_string(),
            key_prefix: key.key_prefix().to_string(),
            owner_id: key.owner_id().as_str().to_string(),
            tier: key.tier().to_string(),
            issued_at: key.issued_at().to_rfc3339(),
            last_used_at: key.last_used_at().map(|dt| dt.to_rfc3339()),
            revoked: key.is_revoked(),
            revoked_at: key.revoked_at().map(|dt| dt.to_rfc3339()),
        }
    }
}

/// API key response with secret (only on creation)
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyWithSecretResponse {
    #[serde(flatten)]
    pub api_key: ApiKeyResponse,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListApiKeysResponse {
    pub api_keys: Vec<ApiKeyResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetLimitsResponse {
    pub key_id: String,
    /// Number of limiter state entries removed
    pub cleared: usize,
}

fn parse_key_id(key_id: &str) -> Result<ApiKeyId, ApiError> {
    Ok(ApiKeyId::new(key_id).map_err(DomainError::from)?)
}

async fn load_key(state: &AppState, id: &ApiKeyId) -> Result<ApiKey, ApiError> {
    state
        .registry()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("API key '{}' not found", id)))
}

/// GET /admin/keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<ListApiKeysResponse>, ApiError> {
    debug!("Admin listing all API keys");

    let keys = state.registry().list().await?;
    let api_keys: Vec<ApiKeyResponse> = keys.iter().map(ApiKeyResponse::from).collect();
    let total = api_keys.len();

    Ok(Json(ListApiKeysResponse { api_keys, total }))
}

/// POST /admin/keys
pub async fn create_api_key(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyWithSecretResponse>), ApiError> {
    debug!(owner_id = %request.owner_id, tier = %request.tier, "Admin issuing API key");

    let owner_id = OwnerId::new(request.owner_id).map_err(DomainError::from)?;

    let issued = state.registry().issue(owner_id, &request.tier).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyWithSecretResponse {
            api_key: ApiKeyResponse::from(&issued.api_key),
            secret: issued.secret,
        }),
    ))
}

/// GET /admin/keys/{key_id}
pub async fn get_api_key(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(key_id): Path<String>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let id = parse_key_id(&key_id)?;
    let key = load_key(&state, &id).await?;

    Ok(Json(ApiKeyResponse::from(&key)))
}

/// POST /admin/keys/{key_id}/revoke
pub async fn revoke_api_key(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(key_id): Path<String>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    debug!(key_id = %key_id, "Admin revoking API key");

    let id = parse_key_id(&key_id)?;
    let key = state.registry().revoke(&id).await?;

    Ok(Json(ApiKeyResponse::from(&key)))
}

/// POST /admin/keys/{key_id}/reset-limits
pub async fn reset_limits(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(key_id): Path<String>,
) -> Result<Json<ResetLimitsResponse>, ApiError> {
    let id = parse_key_id(&key_id)?;
    load_key(&state, &id).await?;

    let cleared = state.limiter().reset(&id).await?;
    info!(key_id = %id, cleared, "Rate limit state reset");

    Ok(Json(ResetLimitsResponse { key_id, cleared }))
}
