//! Caching implementations for cocktail types.

use sha2::{Digest, Sha256};

use crate::cache::{Cacheable, QueryKey};

use super::types::{Category, Drink, DrinkSummary, Ingredient};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for DrinkSummary {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "drink_summary"
  }
}

impl Cacheable for Drink {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "drink"
  }
}

impl Cacheable for Category {
  fn cache_key(&self) -> String {
    self.name.clone()
  }

  fn entity_type() -> &'static str {
    "category"
  }
}

impl Cacheable for Ingredient {
  fn cache_key(&self) -> String {
    self.name.clone()
  }

  fn entity_type() -> &'static str {
    "ingredient"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Query key types for TheCocktailDB list endpoints.
#[derive(Clone, Debug)]
pub enum CocktailQueryKey {
  /// All categories
  Categories,
  /// Drinks in a category
  ByCategory { category: String },
  /// Drinks matching a name search
  SearchName { name: String },
  /// Drinks containing an ingredient
  ByIngredient { ingredient: String },
  /// All ingredients
  Ingredients,
  /// Drinks whose name starts with a letter
  FirstLetter { letter: char },
}

impl QueryKey for CocktailQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::Categories => "categories".to_string(),
      Self::ByCategory { category } => format!("by_category:{}", normalize(category)),
      Self::SearchName { name } => format!("search_name:{}", normalize(name)),
      Self::ByIngredient { ingredient } => format!("by_ingredient:{}", normalize(ingredient)),
      Self::Ingredients => "ingredients".to_string(),
      Self::FirstLetter { letter } => format!("first_letter:{}", letter.to_ascii_lowercase()),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::Categories => "all categories".to_string(),
      Self::ByCategory { category } => format!("drinks in {}", category),
      Self::SearchName { name } => format!("drinks named {}", name),
      Self::ByIngredient { ingredient } => format!("drinks with {}", ingredient),
      Self::Ingredients => "all ingredients".to_string(),
      Self::FirstLetter { letter } => format!("drinks starting with {}", letter),
    }
  }
}

/// Trim and lowercase so equivalent searches share a cache entry.
fn normalize(input: &str) -> String {
  input.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_equivalent_queries_share_hash() {
    let a = CocktailQueryKey::SearchName {
      name: "  Margarita ".to_string(),
    };
    let b = CocktailQueryKey::SearchName {
      name: "margarita".to_string(),
    };
    assert_eq!(a.cache_hash(), b.cache_hash());
    assert_eq!(a.cache_hash().len(), 64);
  }

  #[test]
  fn test_query_kinds_do_not_collide() {
    let by_category = CocktailQueryKey::ByCategory {
      category: "gin".to_string(),
    };
    let by_ingredient = CocktailQueryKey::ByIngredient {
      ingredient: "gin".to_string(),
    };
    assert_ne!(by_category.cache_hash(), by_ingredient.cache_hash());
    assert_ne!(
      CocktailQueryKey::Categories.cache_hash(),
      CocktailQueryKey::Ingredients.cache_hash()
    );
  }

  #[test]
  fn test_first_letter_is_case_insensitive() {
    assert_eq!(
      CocktailQueryKey::FirstLetter { letter: 'M' }.cache_hash(),
      CocktailQueryKey::FirstLetter { letter: 'm' }.cache_hash()
    );
  }
}
