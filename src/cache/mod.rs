//! Generic caching layer for data persistence and offline support.
//!
//! This module provides an API-agnostic caching mechanism that:
//! - Caches entities keyed by type + id, stamped with `last_updated`
//! - Handles full lists and individual item queries
//! - Treats records older than a fixed TTL as stale
//! - Provides basic offline mode (serve stale cache when network unavailable)

mod clock;
mod freshness;
mod layer;
mod storage;
mod traits;

#[cfg(test)]
pub use clock::Clock;
pub use clock::SystemClock;
pub use freshness::{to_datetime, FreshnessPolicy};
pub use layer::CacheLayer;
pub use storage::{CacheStats, CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Cacheable, QueryKey};
