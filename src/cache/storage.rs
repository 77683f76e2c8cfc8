//! Cache storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::freshness::FreshnessPolicy;
use super::traits::Cacheable;

/// Result of a cached query lookup.
#[derive(Debug, Clone)]
pub struct CachedQueryResult<T> {
  /// The cached entities in order
  pub entities: Vec<T>,
  /// When the query result was last written (epoch millis)
  pub last_updated: i64,
}

/// A single cached entity.
#[derive(Debug, Clone)]
pub struct CachedEntity<T> {
  /// The cached entity
  pub entity: T,
  /// When the entity was last written (epoch millis)
  pub last_updated: i64,
}

/// Counts reported by `cache status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub entities: usize,
  pub fresh_entities: usize,
  pub queries: usize,
  pub fresh_queries: usize,
}

/// Trait for cache storage backends.
///
/// Every write stamps `last_updated` with the policy's current time and
/// upserts by `(entity_type, cache_key)`.
pub trait CacheStorage: Send + Sync {
  /// Freshness policy applied to stored records.
  fn policy(&self) -> &FreshnessPolicy;

  /// Store a single entity.
  fn save<T: Cacheable>(&self, entity: &T) -> Result<()>;

  /// Get a single entity by key.
  fn get_entity<T: Cacheable>(&self, entity_key: &str) -> Result<Option<CachedEntity<T>>>;

  /// Get every cached entity of a type.
  fn get_all<T: Cacheable>(&self) -> Result<Vec<CachedEntity<T>>>;

  /// Store entities from a query result.
  fn store_query_result<T: Cacheable>(
    &self,
    key: &str,
    description: &str,
    entities: &[T],
  ) -> Result<()>;

  /// Get cached entities for a query.
  fn get_query_result<T: Cacheable>(&self, key: &str) -> Result<Option<CachedQueryResult<T>>>;

  /// With a key: whether that entity exists and is fresh.
  /// Without: whether any entity of the type is fresh.
  fn is_valid<T: Cacheable>(&self, entity_key: Option<&str>) -> Result<bool>;

  /// Force-expire one entity, or every entity and query of the type.
  fn invalidate<T: Cacheable>(&self, entity_key: Option<&str>) -> Result<usize>;

  /// Delete all stale records. Returns the number of entities removed.
  fn clear_stale(&self) -> Result<usize>;

  /// Delete everything.
  fn clear(&self) -> Result<()>;

  fn stats(&self) -> Result<CacheStats>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
#[derive(Default)]
pub struct NoopStorage {
  policy: FreshnessPolicy,
}

impl CacheStorage for NoopStorage {
  fn policy(&self) -> &FreshnessPolicy {
    &self.policy
  }

  fn save<T: Cacheable>(&self, _entity: &T) -> Result<()> {
    Ok(()) // Discard
  }

  fn get_entity<T: Cacheable>(&self, _entity_key: &str) -> Result<Option<CachedEntity<T>>> {
    Ok(None) // Always miss
  }

  fn get_all<T: Cacheable>(&self) -> Result<Vec<CachedEntity<T>>> {
    Ok(Vec::new())
  }

  fn store_query_result<T: Cacheable>(
    &self,
    _key: &str,
    _description: &str,
    _entities: &[T],
  ) -> Result<()> {
    Ok(()) // Discard
  }

  fn get_query_result<T: Cacheable>(&self, _key: &str) -> Result<Option<CachedQueryResult<T>>> {
    Ok(None) // Always miss
  }

  fn is_valid<T: Cacheable>(&self, _entity_key: Option<&str>) -> Result<bool> {
    Ok(false)
  }

  fn invalidate<T: Cacheable>(&self, _entity_key: Option<&str>) -> Result<usize> {
    Ok(0)
  }

  fn clear_stale(&self) -> Result<usize> {
    Ok(0)
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }

  fn stats(&self) -> Result<CacheStats> {
    Ok(CacheStats::default())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  policy: FreshnessPolicy,
}

impl SqliteStorage {
  /// Open or create the cache database at `path`.
  pub fn open(path: &Path, policy: FreshnessPolicy) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn, policy)
  }

  /// Create a cache that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory(policy: FreshnessPolicy) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn, policy)
  }

  fn with_connection(conn: Connection, policy: FreshnessPolicy) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
      policy,
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Generic entity cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    last_updated INTEGER NOT NULL,
    PRIMARY KEY (entity_type, entity_key)
);

CREATE INDEX IF NOT EXISTS idx_entity_cache_updated
    ON entity_cache(entity_type, last_updated);

-- Query result tracking
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash TEXT PRIMARY KEY,
    query_description TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    last_updated INTEGER NOT NULL,
    result_count INTEGER NOT NULL
);

-- Query to entity mapping (preserves order)
CREATE TABLE IF NOT EXISTS query_results (
    query_hash TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (query_hash, entity_key)
);

CREATE INDEX IF NOT EXISTS idx_query_results_hash ON query_results(query_hash);
"#;

const UPSERT_ENTITY: &str = "INSERT INTO entity_cache (entity_type, entity_key, data, last_updated)
   VALUES (?1, ?2, ?3, ?4)
   ON CONFLICT (entity_type, entity_key)
   DO UPDATE SET data = excluded.data, last_updated = excluded.last_updated";

fn upsert_entity<T: Cacheable>(conn: &Connection, entity: &T, now: i64) -> Result<String> {
  let entity_key = entity.cache_key();
  let data = serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;

  conn
    .execute(
      UPSERT_ENTITY,
      params![T::entity_type(), entity_key, data, now],
    )
    .map_err(|e| eyre!("Failed to store entity: {}", e))?;

  Ok(entity_key)
}

impl CacheStorage for SqliteStorage {
  fn policy(&self) -> &FreshnessPolicy {
    &self.policy
  }

  fn save<T: Cacheable>(&self, entity: &T) -> Result<()> {
    let conn = self.lock()?;
    upsert_entity(&conn, entity, self.policy.now())?;
    Ok(())
  }

  fn get_entity<T: Cacheable>(&self, entity_key: &str) -> Result<Option<CachedEntity<T>>> {
    let conn = self.lock()?;

    let result: Option<(Vec<u8>, i64)> = conn
      .query_row(
        "SELECT data, last_updated FROM entity_cache
         WHERE entity_type = ? AND entity_key = ?",
        params![T::entity_type(), entity_key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query entity: {}", e))?;

    match result {
      Some((data, last_updated)) => {
        let entity: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize entity: {}", e))?;
        Ok(Some(CachedEntity {
          entity,
          last_updated,
        }))
      }
      None => Ok(None),
    }
  }

  fn get_all<T: Cacheable>(&self) -> Result<Vec<CachedEntity<T>>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT data, last_updated FROM entity_cache
         WHERE entity_type = ?
         ORDER BY entity_key",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(Vec<u8>, i64)> = stmt
      .query_map(params![T::entity_type()], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to query entities: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(
      rows
        .into_iter()
        .filter_map(|(data, last_updated)| {
          serde_json::from_slice(&data)
            .ok()
            .map(|entity| CachedEntity {
              entity,
              last_updated,
            })
        })
        .collect(),
    )
  }

  fn store_query_result<T: Cacheable>(
    &self,
    key: &str,
    description: &str,
    entities: &[T],
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let now = self.policy.now();

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Delete existing query results
    tx.execute(
      "DELETE FROM query_results WHERE query_hash = ?",
      params![key],
    )
    .map_err(|e| eyre!("Failed to delete old query results: {}", e))?;

    // Insert/update query cache
    tx.execute(
      "INSERT OR REPLACE INTO query_cache (query_hash, query_description, entity_type, last_updated, result_count)
       VALUES (?, ?, ?, ?, ?)",
      params![key, description, T::entity_type(), now, entities.len()],
    )
    .map_err(|e| eyre!("Failed to update query cache: {}", e))?;

    // Store entities and query results
    for (position, entity) in entities.iter().enumerate() {
      let entity_key = upsert_entity(&tx, entity, now)?;

      tx.execute(
        "INSERT OR REPLACE INTO query_results (query_hash, entity_key, position)
         VALUES (?, ?, ?)",
        params![key, entity_key, position],
      )
      .map_err(|e| eyre!("Failed to store query result: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get_query_result<T: Cacheable>(&self, key: &str) -> Result<Option<CachedQueryResult<T>>> {
    let conn = self.lock()?;
    let entity_type = T::entity_type();

    // Get query metadata
    let last_updated: Option<i64> = conn
      .query_row(
        "SELECT last_updated FROM query_cache
         WHERE query_hash = ? AND entity_type = ?",
        params![key, entity_type],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache metadata: {}", e))?;

    let Some(last_updated) = last_updated else {
      return Ok(None);
    };

    // Get entities in order
    let mut stmt = conn
      .prepare(
        "SELECT ec.data FROM entity_cache ec
         INNER JOIN query_results qr ON ec.entity_type = ? AND ec.entity_key = qr.entity_key
         WHERE qr.query_hash = ?
         ORDER BY qr.position",
      )
      .map_err(|e| eyre!("Failed to prepare entity query: {}", e))?;

    let entities: Vec<T> = stmt
      .query_map(params![entity_type, key], |row| {
        let data: Vec<u8> = row.get(0)?;
        Ok(data)
      })
      .map_err(|e| eyre!("Failed to query entities: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_slice(&data).ok())
      .collect();

    Ok(Some(CachedQueryResult {
      entities,
      last_updated,
    }))
  }

  fn is_valid<T: Cacheable>(&self, entity_key: Option<&str>) -> Result<bool> {
    let conn = self.lock()?;
    let cutoff = self.policy.cutoff();

    let valid: bool = match entity_key {
      Some(key) => conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entity_cache
         WHERE entity_type = ? AND entity_key = ? AND last_updated > ?)",
        params![T::entity_type(), key, cutoff],
        |row| row.get(0),
      ),
      None => conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entity_cache
         WHERE entity_type = ? AND last_updated > ?)",
        params![T::entity_type(), cutoff],
        |row| row.get(0),
      ),
    }
    .map_err(|e| eyre!("Failed to check cache validity: {}", e))?;

    Ok(valid)
  }

  fn invalidate<T: Cacheable>(&self, entity_key: Option<&str>) -> Result<usize> {
    let conn = self.lock()?;
    let expired = self.policy.expired_stamp();
    let entity_type = T::entity_type();

    let count = match entity_key {
      Some(key) => conn
        .execute(
          "UPDATE entity_cache SET last_updated = ?
           WHERE entity_type = ? AND entity_key = ?",
          params![expired, entity_type, key],
        )
        .map_err(|e| eyre!("Failed to invalidate entity: {}", e))?,
      None => {
        conn
          .execute(
            "UPDATE query_cache SET last_updated = ? WHERE entity_type = ?",
            params![expired, entity_type],
          )
          .map_err(|e| eyre!("Failed to invalidate queries: {}", e))?;
        conn
          .execute(
            "UPDATE entity_cache SET last_updated = ? WHERE entity_type = ?",
            params![expired, entity_type],
          )
          .map_err(|e| eyre!("Failed to invalidate entities: {}", e))?
      }
    };

    Ok(count)
  }

  fn clear_stale(&self) -> Result<usize> {
    let mut conn = self.lock()?;
    let cutoff = self.policy.cutoff();

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let removed = tx
      .execute(
        "DELETE FROM entity_cache WHERE last_updated <= ?",
        params![cutoff],
      )
      .map_err(|e| eyre!("Failed to delete stale entities: {}", e))?;

    // Queries go when stale or when any of their members was removed
    tx.execute(
      "DELETE FROM query_cache
       WHERE last_updated <= ?1
          OR EXISTS (
            SELECT 1 FROM query_results qr
            WHERE qr.query_hash = query_cache.query_hash
              AND NOT EXISTS (
                SELECT 1 FROM entity_cache ec
                WHERE ec.entity_type = query_cache.entity_type
                  AND ec.entity_key = qr.entity_key))",
      params![cutoff],
    )
    .map_err(|e| eyre!("Failed to delete stale queries: {}", e))?;

    tx.execute(
      "DELETE FROM query_results
       WHERE query_hash NOT IN (SELECT query_hash FROM query_cache)",
      [],
    )
    .map_err(|e| eyre!("Failed to delete orphaned query results: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed)
  }

  fn clear(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(
        "DELETE FROM query_results;
         DELETE FROM query_cache;
         DELETE FROM entity_cache;",
      )
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }

  fn stats(&self) -> Result<CacheStats> {
    let conn = self.lock()?;
    let cutoff = self.policy.cutoff();

    let (entities, fresh_entities, queries, fresh_queries): (i64, i64, i64, i64) = conn
      .query_row(
        "SELECT
           (SELECT COUNT(*) FROM entity_cache),
           (SELECT COUNT(*) FROM entity_cache WHERE last_updated > ?1),
           (SELECT COUNT(*) FROM query_cache),
           (SELECT COUNT(*) FROM query_cache WHERE last_updated > ?1)",
        params![cutoff],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .map_err(|e| eyre!("Failed to read cache stats: {}", e))?;

    Ok(CacheStats {
      entities: entities as usize,
      fresh_entities: fresh_entities as usize,
      queries: queries as usize,
      fresh_queries: fresh_queries as usize,
    })
  }
}
