//! API Key entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{validate_api_key_id, validate_owner_id, ApiKeyValidationError};

/// API Key identifier - alphanumeric + hyphens, max 50 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiKeyId(String);

impl ApiKeyId {
    /// Create a new ApiKeyId after validation
    pub fn new(id: impl Into<String>) -> Result<Self, ApiKeyValidationError> {
        let id = id.into();
        validate_api_key_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(format!("key-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApiKeyId {
    type Error = ApiKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApiKeyId> for String {
    fn from(id: ApiKeyId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the account that owns a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Result<Self, ApiKeyValidationError> {
        let id = id.into();
        validate_owner_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerId {
    type Error = ApiKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(id: OwnerId) -> Self {
        id.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// API Key entity
///
/// Only the hash of the secret is kept. Revoked keys stay in storage with
/// `revoked` set so the audit trail survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    id: ApiKeyId,
    /// Format: algorithm$hash (e.g., "sha256$...")
    secret_hash: String,
    /// Environment prefix plus the first 8 characters of the secret
    key_prefix: String,
    owner_id: OwnerId,
    tier: String,
    issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
    revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Create a new, active API key
    pub fn new(
        id: ApiKeyId,
        secret_hash: impl Into<String>,
        key_prefix: impl Into<String>,
        owner_id: OwnerId,
        tier: impl Into<String>,
    ) -> Self {
        Self {
            id,
            secret_hash: secret_hash.into(),
            key_prefix: key_prefix.into(),
            owner_id,
            tier: tier.into(),
            issued_at: Utc::now(),
            last_used_at: None,
            revoked: false,
            revoked_at: None,
        }
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.id
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn tier(&self) -> &str {
        &self.tier
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }

    // Mutators

    /// Record key usage
    pub fn record_usage(&mut self, at: DateTime<Utc>) {
        self.last_used_at = Some(at);
    }

    /// Revoke the key. Returns false if it was already revoked.
    pub fn revoke(&mut self) -> bool {
        if self.revoked {
            return false;
        }

        self.revoked = true;
        self.revoked_at = Some(Utc::now());
        true
    }
}

/// The authenticated caller behind a validated key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub key_id: ApiKeyId,
    pub owner_id: OwnerId,
    pub tier: String,
}

impl From<&ApiKey> for Principal {
    fn from(key: &ApiKey) -> Self {
        Self {
            key_id: key.id.clone(),
            owner_id: key.owner_id.clone(),
            tier: key.tier.clone(),
        }
    }
}
