//! Domain layer - Core types, rules and contracts

pub mod api_key;
pub mod cache;
pub mod error;
pub mod gateway;
pub mod rate_limit;
pub mod routing;

pub use api_key::{ApiKey, ApiKeyId, ApiKeyRepository, ApiKeyValidationError, OwnerId, Principal};
pub use cache::{CacheKey, CacheKeyParams, SharedCache};
pub use error::DomainError;
pub use gateway::{
    AuthError, Backend, BackendError, BackendRequest, BackendResponse, CacheError, GatewayError,
    RateLimitError, RoutingError,
};
pub use rate_limit::{
    Algorithm, Clock, LimitPolicy, RateLimitDecision, RateLimitStore, RateLimitTier, TierTable,
};
pub use routing::{Route, RouteTable};
