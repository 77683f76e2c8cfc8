//! Serde-deserializable types matching TheCocktailDB API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use std::collections::HashMap;

use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;

use super::types::{Category, Drink, DrinkSummary, Ingredient, IngredientMeasure};

/// The API lists up to this many numbered ingredient/measure fields
const MAX_INGREDIENTS: usize = 15;

// ============================================================================
// Response envelope
// ============================================================================

/// Every endpoint wraps its results in `{"drinks": ...}`.
///
/// When nothing matches, `drinks` is `null`, missing, or the empty string.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiDrinksResponse<T> {
  #[serde(default, deserialize_with = "lenient_list")]
  pub drinks: Vec<T>,
}

impl<T> Default for ApiDrinksResponse<T> {
  fn default() -> Self {
    Self { drinks: Vec::new() }
  }
}

/// Decode a list that may arrive as a string or null instead of an array.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  match Option::<Value>::deserialize(deserializer)? {
    Some(value @ Value::Array(_)) => Vec::<T>::deserialize(value).map_err(D::Error::custom),
    Some(Value::String(_)) | Some(Value::Null) | None => Ok(Vec::new()),
    Some(other) => Err(D::Error::custom(format!(
      "expected a list of drinks, found {}",
      other
    ))),
  }
}

// ============================================================================
// Drink payloads
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiDrinkSummary {
  #[serde(rename = "idDrink")]
  pub id: String,
  #[serde(rename = "strDrink")]
  pub name: String,
  #[serde(rename = "strDrinkThumb")]
  pub thumbnail: Option<String>,
}

impl From<ApiDrinkSummary> for DrinkSummary {
  fn from(api: ApiDrinkSummary) -> Self {
    Self {
      id: api.id,
      name: api.name,
      thumbnail: non_empty(api.thumbnail),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiDrink {
  #[serde(rename = "idDrink")]
  pub id: String,
  #[serde(rename = "strDrink")]
  pub name: String,
  #[serde(rename = "strCategory")]
  pub category: Option<String>,
  #[serde(rename = "strAlcoholic")]
  pub alcoholic: Option<String>,
  #[serde(rename = "strGlass")]
  pub glass: Option<String>,
  #[serde(rename = "strInstructions")]
  pub instructions: Option<String>,
  #[serde(rename = "strDrinkThumb")]
  pub thumbnail: Option<String>,
  /// Comma-separated
  #[serde(rename = "strTags")]
  pub tags: Option<String>,
  #[serde(rename = "dateModified")]
  pub modified: Option<String>,
  // Catch-all for strIngredientN / strMeasureN and translations
  #[serde(flatten)]
  pub extra: HashMap<String, Value>,
}

impl ApiDrink {
  fn numbered(&self, prefix: &str, n: usize) -> Option<String> {
    self
      .extra
      .get(&format!("{}{}", prefix, n))
      .and_then(Value::as_str)
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(String::from)
  }

  pub fn into_drink(self) -> Drink {
    let ingredients = (1..=MAX_INGREDIENTS)
      .filter_map(|n| {
        self.numbered("strIngredient", n).map(|name| IngredientMeasure {
          name,
          measure: self.numbered("strMeasure", n),
        })
      })
      .collect();

    let tags = self
      .tags
      .as_deref()
      .map(|t| {
        t.split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(String::from)
          .collect()
      })
      .unwrap_or_default();

    Drink {
      id: self.id,
      name: self.name,
      category: non_empty(self.category),
      alcoholic: non_empty(self.alcoholic),
      glass: non_empty(self.glass),
      instructions: non_empty(self.instructions),
      thumbnail: non_empty(self.thumbnail),
      tags,
      ingredients,
      modified: non_empty(self.modified),
    }
  }
}

// ============================================================================
// List endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCategory {
  #[serde(rename = "strCategory")]
  pub name: String,
}

impl From<ApiCategory> for Category {
  fn from(api: ApiCategory) -> Self {
    Self { name: api.name }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiIngredient {
  #[serde(rename = "strIngredient1")]
  pub name: String,
}

impl From<ApiIngredient> for Ingredient {
  fn from(api: ApiIngredient) -> Self {
    Self { name: api.name }
  }
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn summaries(body: &str) -> Vec<ApiDrinkSummary> {
    serde_json::from_str::<ApiDrinksResponse<ApiDrinkSummary>>(body)
      .unwrap()
      .drinks
  }

  #[test]
  fn test_empty_string_drinks_is_empty_list() {
    assert!(summaries(r#"{"drinks": ""}"#).is_empty());
    assert!(summaries(r#"{"drinks": "no data found"}"#).is_empty());
    assert!(summaries(r#"{"drinks": null}"#).is_empty());
    assert!(summaries(r#"{"drinks": []}"#).is_empty());
    assert!(summaries(r#"{}"#).is_empty());
  }

  #[test]
  fn test_unexpected_drinks_shape_is_an_error() {
    let result = serde_json::from_str::<ApiDrinksResponse<ApiDrinkSummary>>(r#"{"drinks": 5}"#);
    assert!(result.is_err());
  }

  #[test]
  fn test_malformed_entry_is_an_error() {
    let result =
      serde_json::from_str::<ApiDrinksResponse<ApiDrinkSummary>>(r#"{"drinks": [{"idDrink": 1}]}"#);
    assert!(result.is_err());
  }

  #[test]
  fn test_summary_decoding() {
    let drinks = summaries(
      r#"{"drinks": [{"strDrink": "Mojito", "strDrinkThumb": "https://x/mojito.jpg", "idDrink": "11000"}]}"#,
    );
    let summary: DrinkSummary = drinks.into_iter().next().unwrap().into();
    assert_eq!(summary.id, "11000");
    assert_eq!(summary.name, "Mojito");
    assert_eq!(summary.thumbnail.as_deref(), Some("https://x/mojito.jpg"));
  }

  #[test]
  fn test_full_drink_collects_numbered_ingredients() {
    let body = r#"{"drinks": [{
      "idDrink": "11007",
      "strDrink": "Margarita",
      "strTags": "IBA, ContemporaryClassic",
      "strCategory": "Ordinary Drink",
      "strAlcoholic": "Alcoholic",
      "strGlass": "Cocktail glass",
      "strInstructions": "Rub the rim of the glass with the lime slice.",
      "strDrinkThumb": "",
      "strIngredient1": "Tequila",
      "strIngredient2": "Triple sec",
      "strIngredient3": "Lime juice",
      "strIngredient4": " ",
      "strIngredient5": null,
      "strMeasure1": "1 1/2 oz ",
      "strMeasure2": "1/2 oz ",
      "strMeasure3": null,
      "strInstructionsDE": "Reiben Sie den Rand des Glases.",
      "dateModified": "2015-08-18 14:42:59"
    }]}"#;

    let response: ApiDrinksResponse<ApiDrink> = serde_json::from_str(body).unwrap();
    let drink = response.drinks.into_iter().next().unwrap().into_drink();

    assert_eq!(drink.name, "Margarita");
    assert_eq!(drink.tags, vec!["IBA", "ContemporaryClassic"]);
    assert_eq!(drink.thumbnail, None);
    assert_eq!(drink.ingredients.len(), 3);
    assert_eq!(drink.ingredients[0].name, "Tequila");
    assert_eq!(drink.ingredients[0].measure.as_deref(), Some("1 1/2 oz"));
    assert_eq!(drink.ingredients[2].measure, None);
    assert_eq!(drink.modified.as_deref(), Some("2015-08-18 14:42:59"));
  }

  #[test]
  fn test_list_endpoints() {
    let categories: ApiDrinksResponse<ApiCategory> =
      serde_json::from_str(r#"{"drinks": [{"strCategory": "Shot"}]}"#).unwrap();
    assert_eq!(Category::from(categories.drinks.into_iter().next().unwrap()).name, "Shot");

    let ingredients: ApiDrinksResponse<ApiIngredient> =
      serde_json::from_str(r#"{"drinks": [{"strIngredient1": "Gin"}]}"#).unwrap();
    assert_eq!(Ingredient::from(ingredients.drinks.into_iter().next().unwrap()).name, "Gin");
  }
}
