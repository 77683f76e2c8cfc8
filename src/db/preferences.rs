use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};

use super::Database;

/// Last category passed to `category`
pub const LAST_CATEGORY: &str = "last_category";
/// Last ingredient passed to `ingredient`
pub const LAST_INGREDIENT: &str = "last_ingredient";
/// Epoch millis of the last full cache clear
pub const CACHE_CLEARED_AT: &str = "cache_cleared_at";

impl Database {
  pub fn preference(&self, key: &str) -> Result<Option<String>> {
    self
      .conn()?
      .query_row(
        "SELECT value FROM preferences WHERE key = ?1",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read preference {}: {}", key, e))
  }

  pub fn set_preference(&self, key: &str, value: &str) -> Result<()> {
    self
      .conn()?
      .execute(
        "INSERT INTO preferences (key, value) VALUES (?1, ?2)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write preference {}: {}", key, e))?;
    Ok(())
  }

  /// Returns whether the key existed.
  pub fn remove_preference(&self, key: &str) -> Result<bool> {
    let removed = self
      .conn()?
      .execute("DELETE FROM preferences WHERE key = ?1", params![key])
      .map_err(|e| eyre!("Failed to remove preference {}: {}", key, e))?;
    Ok(removed > 0)
  }
}
