//! Plain-text rendering for command output.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::cache::{to_datetime, CacheResult, CacheSource, CacheStats};
use crate::cocktail::{Category, Drink, DrinkSummary, Favorite, Ingredient};
use crate::net::{ApiError, Connectivity, RateLimitSnapshot};

/// One line per drink: `id  name`
pub fn drink_summaries(drinks: &[DrinkSummary]) -> String {
  if drinks.is_empty() {
    return "No drinks found.".to_string();
  }
  drinks
    .iter()
    .map(|d| format!("{:>8}  {}", d.id, d.name))
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn drinks(drinks: &[Drink]) -> String {
  let summaries: Vec<DrinkSummary> = drinks.iter().map(Drink::summary).collect();
  drink_summaries(&summaries)
}

pub fn categories(categories: &[Category]) -> String {
  names(categories.iter().map(|c| c.name.as_str()), "No categories found.")
}

pub fn ingredients(ingredients: &[Ingredient]) -> String {
  names(ingredients.iter().map(|i| i.name.as_str()), "No ingredients found.")
}

fn names<'a>(names: impl Iterator<Item = &'a str>, empty: &str) -> String {
  let lines: Vec<&str> = names.collect();
  if lines.is_empty() {
    empty.to_string()
  } else {
    lines.join("\n")
  }
}

/// Full recipe card
pub fn recipe(drink: &Drink) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{} (#{})", drink.name, drink.id);

  let details: Vec<&str> = [&drink.category, &drink.alcoholic, &drink.glass]
    .into_iter()
    .filter_map(|field| field.as_deref())
    .collect();
  if !details.is_empty() {
    let _ = writeln!(out, "{}", details.join(" | "));
  }
  if !drink.tags.is_empty() {
    let _ = writeln!(out, "Tags: {}", drink.tags.join(", "));
  }

  if !drink.ingredients.is_empty() {
    let _ = writeln!(out, "\nIngredients:");
    for item in &drink.ingredients {
      match &item.measure {
        Some(measure) => {
          let _ = writeln!(out, "  - {} {}", measure, item.name);
        }
        None => {
          let _ = writeln!(out, "  - {}", item.name);
        }
      }
    }
  }

  if let Some(instructions) = &drink.instructions {
    let _ = writeln!(out, "\n{}", instructions);
  }
  if let Some(thumbnail) = &drink.thumbnail {
    let _ = writeln!(out, "\n{}", thumbnail);
  }
  out.trim_end().to_string()
}

pub fn favorites(favorites: &[Favorite]) -> String {
  if favorites.is_empty() {
    return "No favorites yet.".to_string();
  }
  favorites
    .iter()
    .map(|f| {
      let added = to_datetime(f.added_at)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
      format!("{:>8}  {:<32} {}", f.drink.id, f.drink.name, added)
    })
    .collect::<Vec<_>>()
    .join("\n")
}

/// Note describing where a cached result came from, if not the network.
pub fn source_note<T>(result: &CacheResult<T>, now: DateTime<Utc>) -> Option<String> {
  let age = result
    .cached_at
    .map(|at| format!(" from {}", relative(now, at)))
    .unwrap_or_default();
  match result.source {
    CacheSource::Network => None,
    CacheSource::CacheFresh => Some(format!("(cached{})", age)),
    CacheSource::Offline => Some(format!("(offline: showing saved data{})", age)),
  }
}

fn relative(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
  let minutes = (now - then).num_minutes().max(0);
  match minutes {
    0 => "just now".to_string(),
    1..=59 => format!("{}m ago", minutes),
    60..=1439 => format!("{}h ago", minutes / 60),
    _ => format!("{}d ago", minutes / 1440),
  }
}

/// User-facing error text; the technical detail is only shown when verbose.
pub fn error(err: &ApiError, verbose: bool) -> String {
  if verbose {
    format!("{}\n  {}", err.user_message(), err)
  } else {
    err.user_message().to_string()
  }
}

pub fn cache_stats(stats: &CacheStats, cleared_at: Option<i64>) -> String {
  let mut out = format!(
    "Entities: {} ({} fresh)\nQueries:  {} ({} fresh)",
    stats.entities, stats.fresh_entities, stats.queries, stats.fresh_queries
  );
  if let Some(at) = cleared_at.and_then(to_datetime) {
    let _ = write!(out, "\nLast cleared: {}", at.format("%Y-%m-%d %H:%M UTC"));
  }
  out
}

pub fn status(connectivity: Connectivity, limiter: Option<RateLimitSnapshot>) -> String {
  let network = if connectivity.is_available() {
    "online"
  } else if connectivity.active {
    "connected, no internet"
  } else {
    "offline"
  };
  let mut out = format!("Network: {}", network);
  if let Some(snapshot) = limiter {
    let _ = write!(
      out,
      "\nRate limit: {}/{} calls this minute",
      snapshot.calls_in_window, snapshot.max_calls_per_minute
    );
    if snapshot.retry_count > 0 {
      let _ = write!(out, " ({} backoffs pending)", snapshot.retry_count);
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cocktail::IngredientMeasure;
  use crate::net::ApiErrorKind;
  use chrono::Duration;

  fn mojito() -> Drink {
    Drink {
      id: "11000".to_string(),
      name: "Mojito".to_string(),
      category: Some("Cocktail".to_string()),
      alcoholic: Some("Alcoholic".to_string()),
      glass: None,
      instructions: Some("Muddle mint leaves.".to_string()),
      thumbnail: None,
      tags: vec![],
      ingredients: vec![
        IngredientMeasure {
          name: "Light rum".to_string(),
          measure: Some("2-3 oz".to_string()),
        },
        IngredientMeasure {
          name: "Mint".to_string(),
          measure: None,
        },
      ],
      modified: None,
    }
  }

  #[test]
  fn test_recipe_card() {
    let card = recipe(&mojito());
    assert!(card.starts_with("Mojito (#11000)\nCocktail | Alcoholic"));
    assert!(card.contains("  - 2-3 oz Light rum"));
    assert!(card.contains("  - Mint"));
    assert!(card.ends_with("Muddle mint leaves."));
  }

  #[test]
  fn test_empty_lists() {
    assert_eq!(drink_summaries(&[]), "No drinks found.");
    assert_eq!(favorites(&[]), "No favorites yet.");
  }

  #[test]
  fn test_source_note() {
    let now = Utc::now();
    let network = CacheResult::from_network(());
    assert_eq!(source_note(&network, now), None);

    let stale = CacheResult {
      data: (),
      source: CacheSource::Offline,
      cached_at: Some(now - Duration::hours(30)),
    };
    assert_eq!(
      source_note(&stale, now).as_deref(),
      Some("(offline: showing saved data from 1d ago)")
    );
  }

  #[test]
  fn test_error_hides_details_unless_verbose() {
    let err = ApiError::new(ApiErrorKind::Server, "lookup.php: HTTP 502").with_code(502);
    assert_eq!(error(&err, false), ApiErrorKind::Server.user_message());
    assert!(error(&err, true).contains("lookup.php: HTTP 502"));
  }

  #[test]
  fn test_status() {
    let snapshot = RateLimitSnapshot {
      calls_in_window: 3,
      max_calls_per_minute: 30,
      retry_count: 0,
    };
    assert_eq!(
      status(Connectivity::ONLINE, Some(snapshot)),
      "Network: online\nRate limit: 3/30 calls this minute"
    );
    assert_eq!(status(Connectivity::OFFLINE, None), "Network: offline");
  }
}
