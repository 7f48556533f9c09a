//! Cache domain - keys and the shared (L2) cache contract

mod key;
mod shared;

pub use key::{stable_hash, CacheKey, CacheKeyParams};
pub use shared::SharedCache;

#[cfg(test)]
pub use shared::mock::MockSharedCache;
