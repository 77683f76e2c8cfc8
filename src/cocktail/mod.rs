//! TheCocktailDB client, cache keys and repository.

mod api_types;
mod cache;
mod client;
mod repository;
mod types;

pub use client::CocktailClient;
pub use repository::CocktailRepository;
pub use types::{Category, Drink, DrinkSummary, Favorite, Ingredient};
#[cfg(test)]
pub use types::IngredientMeasure;
