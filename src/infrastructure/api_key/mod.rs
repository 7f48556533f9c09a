//! API key infrastructure: generation, storage and the registry

mod generator;
mod registry;
mod repository;

pub use generator::{hash_key, ApiKeyGenerator, GeneratedApiKey, KeyEnvironment};
pub use registry::{ApiKeyRegistry, IssuedApiKey};
pub use repository::InMemoryApiKeyRepository;
