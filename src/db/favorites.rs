use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::cocktail::{DrinkSummary, Favorite};

impl Database {
  /// Mark a drink as favorite. Re-adding keeps the original timestamp.
  pub fn add_favorite(&self, drink: &DrinkSummary, added_at: i64) -> Result<()> {
    self
      .conn()?
      .execute(
        "INSERT INTO favorites (drink_id, name, thumbnail, added_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (drink_id)
         DO UPDATE SET name = excluded.name, thumbnail = excluded.thumbnail",
        params![drink.id, drink.name, drink.thumbnail, added_at],
      )
      .map_err(|e| eyre!("Failed to add favorite: {}", e))?;
    Ok(())
  }

  /// Returns whether a favorite was removed.
  pub fn remove_favorite(&self, drink_id: &str) -> Result<bool> {
    let removed = self
      .conn()?
      .execute("DELETE FROM favorites WHERE drink_id = ?1", params![drink_id])
      .map_err(|e| eyre!("Failed to remove favorite: {}", e))?;
    Ok(removed > 0)
  }

  /// Favorites, most recently added first
  pub fn favorites(&self) -> Result<Vec<Favorite>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT drink_id, name, thumbnail, added_at FROM favorites
         ORDER BY added_at DESC, name ASC",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok(Favorite {
          drink: DrinkSummary {
            id: row.get(0)?,
            name: row.get(1)?,
            thumbnail: row.get(2)?,
          },
          added_at: row.get(3)?,
        })
      })
      .map_err(|e| eyre!("Failed to query favorites: {}", e))?;

    rows
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read favorite: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn drink(id: &str, name: &str) -> DrinkSummary {
    DrinkSummary {
      id: id.to_string(),
      name: name.to_string(),
      thumbnail: None,
    }
  }

  #[test]
  fn test_add_is_idempotent() {
    let db = Database::open_in_memory().unwrap();
    db.add_favorite(&drink("1", "Mojito"), 10).unwrap();
    db.add_favorite(&drink("1", "Mojito"), 20).unwrap();

    let favorites = db.favorites().unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].added_at, 10);
  }

  #[test]
  fn test_remove_reports_whether_present() {
    let db = Database::open_in_memory().unwrap();
    db.add_favorite(&drink("1", "Mojito"), 1).unwrap();

    assert!(db.remove_favorite("1").unwrap());
    assert!(!db.remove_favorite("1").unwrap());
    assert!(db.favorites().unwrap().is_empty());
  }

  #[test]
  fn test_list_newest_first() {
    let db = Database::open_in_memory().unwrap();
    db.add_favorite(&drink("1", "Mojito"), 1).unwrap();
    db.add_favorite(&drink("2", "Negroni"), 2).unwrap();

    let names: Vec<_> = db
      .favorites()
      .unwrap()
      .into_iter()
      .map(|f| f.drink.name)
      .collect();
    assert_eq!(names, vec!["Negroni", "Mojito"]);
  }

  #[test]
  fn test_remove_missing_is_false() {
    let db = Database::open_in_memory().unwrap();
    assert!(!db.remove_favorite("404").unwrap());
  }
}
