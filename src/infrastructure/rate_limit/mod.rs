//! Rate limiting infrastructure: state stores and the limiter service

mod in_memory;
mod limiter;
mod redis;

pub use in_memory::InMemoryRateLimitStore;
pub use limiter::{RateLimitOutcome, RateLimiter};
pub use self::redis::{RedisRateLimitStore, RedisRateLimitStoreConfig};
