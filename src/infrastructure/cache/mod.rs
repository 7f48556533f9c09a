//! Cache infrastructure: L1 LRU layer, shared L2 stores, and the
//! multi-layer cache that combines them

mod factory;
mod in_memory;
mod lru;
mod multi_layer;
mod redis;

pub use factory::{create_shared_cache, SharedCacheBackend, SharedCacheSettings};
pub use in_memory::{InMemorySharedCache, InMemorySharedCacheConfig};
pub use self::lru::{L1EntryMeta, LruLayer, DEFAULT_L1_TTL};
pub use multi_layer::{
    CacheStats, CacheStatus, CacheTtl, CachedCall, InvalidationReport, MultiLayerCache,
    MultiLayerCacheConfig,
};
pub use self::redis::{RedisSharedCache, RedisSharedCacheConfig};

pub(crate) use self::redis::{escape_glob, scan_delete};
