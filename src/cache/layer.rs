//! Cache layer that orchestrates caching logic with network fetching.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, Cacheable, QueryKey};
use crate::net::{ApiError, NetworkMonitor};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the repository and the network client,
/// providing transparent caching with offline support.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  monitor: Arc<NetworkMonitor>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S, monitor: Arc<NetworkMonitor>) -> Self {
    Self {
      storage: Arc::new(storage),
      monitor,
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn is_online(&self) -> bool {
    self.monitor.is_available()
  }

  /// Fetch a list with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On network failure or while offline, return stale cache
  /// 4. Update cache with new data
  pub async fn fetch_list<T, K, F, Fut>(
    &self,
    key: &K,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>, ApiError>
  where
    T: Cacheable,
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, ApiError>>,
  {
    let hash = key.cache_hash();

    // Check cache first
    if let Some(cached) = self.storage.get_query_result::<T>(&hash)? {
      if self.storage.policy().is_fresh(cached.last_updated) {
        debug!(query = %key.description(), "Serving fresh cached list");
        return Ok(CacheResult::from_cache(cached.entities, cached.last_updated));
      }

      if !self.monitor.is_available() {
        debug!(query = %key.description(), "Offline, serving stale cached list");
        return Ok(CacheResult::offline(cached.entities, cached.last_updated));
      }

      // Cache is stale, try to fetch from network
      match fetcher().await {
        Ok(data) => {
          self
            .storage
            .store_query_result(&hash, &key.description(), &data)?;
          Ok(CacheResult::from_network(data))
        }
        Err(e) => {
          warn!(query = %key.description(), error = %e, "Refresh failed, serving stale cache");
          Ok(CacheResult::offline(cached.entities, cached.last_updated))
        }
      }
    } else {
      // No cache, must fetch from network
      let data = fetcher().await?;
      self
        .storage
        .store_query_result(&hash, &key.description(), &data)?;
      Ok(CacheResult::from_network(data))
    }
  }

  /// Fetch a single entity with caching.
  pub async fn fetch_one<T, F, Fut>(
    &self,
    entity_key: &str,
    fetcher: F,
  ) -> Result<CacheResult<T>, ApiError>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    // Check cache first
    if let Some(cached) = self.storage.get_entity::<T>(entity_key)? {
      if self.storage.is_valid::<T>(Some(entity_key))? {
        debug!(entity = T::entity_type(), key = entity_key, "Serving fresh cached entity");
        return Ok(CacheResult::from_cache(cached.entity, cached.last_updated));
      }

      if !self.monitor.is_available() {
        debug!(entity = T::entity_type(), key = entity_key, "Offline, serving stale entity");
        return Ok(CacheResult::offline(cached.entity, cached.last_updated));
      }

      // Cache is stale, try to fetch from network
      match fetcher().await {
        Ok(data) => {
          self.storage.save(&data)?;
          Ok(CacheResult::from_network(data))
        }
        Err(e) => {
          warn!(entity = T::entity_type(), key = entity_key, error = %e, "Refresh failed, serving stale entity");
          Ok(CacheResult::offline(cached.entity, cached.last_updated))
        }
      }
    } else {
      // No cache, must fetch from network
      let data = fetcher().await?;
      self.storage.save(&data)?;
      Ok(CacheResult::from_network(data))
    }
  }

  /// Persist an entity fetched outside the cache-first flow.
  pub fn save<T: Cacheable>(&self, entity: &T) -> Result<(), ApiError> {
    Ok(self.storage.save(entity)?)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      monitor: Arc::clone(&self.monitor),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::freshness::{FreshnessPolicy, DEFAULT_TTL};
  use crate::cache::storage::{NoopStorage, SqliteStorage};
  use crate::cache::traits::CacheSource;
  use crate::net::{ApiErrorKind, Connectivity};
  use crate::testing::ManualClock;
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicU32, Ordering};

  const HOUR: i64 = 60 * 60 * 1000;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Item {
    id: String,
    version: u32,
  }

  impl Cacheable for Item {
    fn cache_key(&self) -> String {
      self.id.clone()
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  struct Key(&'static str);

  impl QueryKey for Key {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      format!("items {}", self.0)
    }
  }

  fn item(id: &str, version: u32) -> Item {
    Item {
      id: id.to_string(),
      version,
    }
  }

  struct Fixture {
    layer: CacheLayer<SqliteStorage>,
    clock: Arc<ManualClock>,
    monitor: Arc<NetworkMonitor>,
  }

  fn fixture() -> Fixture {
    let clock = ManualClock::new(500 * HOUR);
    let policy = FreshnessPolicy::new(DEFAULT_TTL, clock.clone());
    let monitor = Arc::new(NetworkMonitor::manual(Connectivity::ONLINE));
    let layer = CacheLayer::new(
      SqliteStorage::open_in_memory(policy).unwrap(),
      Arc::clone(&monitor),
    );
    Fixture {
      layer,
      clock,
      monitor,
    }
  }

  fn server_error() -> ApiError {
    ApiError::new(ApiErrorKind::Server, "down").with_retryable(true)
  }

  #[tokio::test]
  async fn test_fresh_list_served_from_cache() {
    let fx = fixture();
    let calls = &AtomicU32::new(0);
    let fetch = || async move {
      calls.fetch_add(1, Ordering::SeqCst);
      Ok(vec![item("a", 1), item("b", 1)])
    };

    let first = fx.layer.fetch_list(&Key("all"), fetch).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = fx.layer.fetch_list(&Key("all"), fetch).await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, first.data);
    assert!(second.cached_at.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stale_list_is_refetched() {
    let fx = fixture();
    fx.layer
      .fetch_list(&Key("all"), || async { Ok(vec![item("a", 1)]) })
      .await
      .unwrap();

    fx.clock.advance(25 * HOUR);
    let result = fx
      .layer
      .fetch_list(&Key("all"), || async { Ok(vec![item("a", 2)]) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, vec![item("a", 2)]);
  }

  #[tokio::test]
  async fn test_failed_refresh_serves_stale_data() {
    let fx = fixture();
    fx.layer
      .fetch_one("a", || async { Ok(item("a", 1)) })
      .await
      .unwrap();

    fx.clock.advance(25 * HOUR);
    let result = fx
      .layer
      .fetch_one::<Item, _, _>("a", || async { Err(server_error()) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.version, 1);
  }

  #[tokio::test]
  async fn test_offline_skips_network_for_stale_data() {
    let fx = fixture();
    fx.layer
      .fetch_one("a", || async { Ok(item("a", 1)) })
      .await
      .unwrap();
    fx.clock.advance(25 * HOUR);
    fx.monitor.set(Connectivity::OFFLINE);

    let calls = &AtomicU32::new(0);
    let result = fx
      .layer
      .fetch_one("a", || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(item("a", 2))
      })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_miss_propagates_fetch_error() {
    let fx = fixture();
    let err = fx
      .layer
      .fetch_one::<Item, _, _>("a", || async { Err(ApiError::not_found("a")) })
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ApiErrorKind::NotFound);
  }

  #[tokio::test]
  async fn test_refresh_after_expiry_restamps_record() {
    let fx = fixture();
    fx.layer
      .fetch_one("x", || async { Ok(item("x", 1)) })
      .await
      .unwrap();
    fx.clock.advance(25 * HOUR);
    assert!(!fx.layer.storage().is_valid::<Item>(Some("x")).unwrap());

    fx.layer
      .fetch_one("x", || async { Ok(item("x", 2)) })
      .await
      .unwrap();

    let cached = fx.layer.storage().get_entity::<Item>("x").unwrap().unwrap();
    assert_eq!(cached.last_updated, 525 * HOUR);
    assert!(fx.layer.storage().is_valid::<Item>(Some("x")).unwrap());
  }

  #[tokio::test]
  async fn test_invalidated_entity_is_refetched() {
    let fx = fixture();
    fx.layer
      .fetch_one("a", || async { Ok(item("a", 1)) })
      .await
      .unwrap();
    assert_eq!(fx.layer.storage().invalidate::<Item>(Some("a")).unwrap(), 1);

    let result = fx
      .layer
      .fetch_one("a", || async { Ok(item("a", 2)) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.version, 2);

    let again = fx
      .layer
      .fetch_one::<Item, _, _>("a", || async { Err(server_error()) })
      .await
      .unwrap();
    assert_eq!(again.source, CacheSource::CacheFresh);
    assert_eq!(again.data.version, 2);
  }

  #[tokio::test]
  async fn test_disabled_cache_always_fetches() {
    let monitor = Arc::new(NetworkMonitor::manual(Connectivity::ONLINE));
    let layer = CacheLayer::new(NoopStorage::default(), monitor);
    let calls = &AtomicU32::new(0);
    for _ in 0..2 {
      let result = layer
        .fetch_one("a", || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(item("a", 1))
        })
        .await
        .unwrap();
      assert_eq!(result.source, CacheSource::Network);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
