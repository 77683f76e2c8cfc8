//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use super::freshness::to_datetime;

/// Trait for entities that can be cached.
///
/// Implementors provide a unique cache key within their entity type.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity (e.g., drink id, category name)
  fn cache_key(&self) -> String;

  /// Entity type name for storage organization (e.g., "drink", "category")
  fn entity_type() -> &'static str;
}

/// Key for a cached list query.
pub trait QueryKey {
  /// Stable, fixed-length hash identifying the query
  fn cache_hash(&self) -> String;

  /// Human-readable description for diagnostics
  fn description(&self) -> String;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from fresh cached data.
  pub fn from_cache(data: T, last_updated: i64) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: to_datetime(last_updated),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, last_updated: i64) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: to_datetime(last_updated),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Offline mode - network unavailable or failing, serving stale cached data
  Offline,
}
