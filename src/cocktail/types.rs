use serde::{Deserialize, Serialize};

/// Summary of a drink for list views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkSummary {
  pub id: String,
  pub name: String,
  pub thumbnail: Option<String>,
}

/// Full drink recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drink {
  pub id: String,
  pub name: String,
  pub category: Option<String>,
  pub alcoholic: Option<String>,
  pub glass: Option<String>,
  pub instructions: Option<String>,
  pub thumbnail: Option<String>,
  pub tags: Vec<String>,
  pub ingredients: Vec<IngredientMeasure>,
  pub modified: Option<String>,
}

impl Drink {
  pub fn summary(&self) -> DrinkSummary {
    DrinkSummary {
      id: self.id.clone(),
      name: self.name.clone(),
      thumbnail: self.thumbnail.clone(),
    }
  }
}

/// One line of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientMeasure {
  pub name: String,
  pub measure: Option<String>,
}

/// Drink category (e.g. "Cocktail", "Shot")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub name: String,
}

/// Ingredient name as listed by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
  pub name: String,
}

/// A drink the user marked as favorite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favorite {
  pub drink: DrinkSummary,
  /// Epoch millis
  pub added_at: i64,
}
