//! API Key domain
//!
//! Domain types and traits for caller credentials: the key entity, its
//! owner and tier binding, and the storage contract.

mod entity;
mod repository;
mod validation;

pub use entity::{ApiKey, ApiKeyId, OwnerId, Principal};
pub use repository::ApiKeyRepository;
pub use validation::{validate_api_key_id, validate_owner_id, ApiKeyValidationError};
