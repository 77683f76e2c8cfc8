use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::cocktail::api_types::{
  ApiCategory, ApiDrink, ApiDrinkSummary, ApiDrinksResponse, ApiIngredient,
};
use crate::cocktail::types::{Category, Drink, DrinkSummary, Ingredient};
use crate::config::Config;
use crate::net::{RateLimiter, TransportError};

/// Longest error body kept in a `TransportError::Status`
const MAX_ERROR_BODY: usize = 512;

/// TheCocktailDB API client. Every request passes through the rate limiter.
#[derive(Clone)]
pub struct CocktailClient {
  http: reqwest::Client,
  base_url: Url,
  limiter: RateLimiter,
}

impl CocktailClient {
  pub fn new(config: &Config, limiter: RateLimiter) -> Result<Self> {
    let base_url = Self::base_url(&config.api.url, &Config::api_key())?;
    Self::with_base_url(
      base_url,
      Duration::from_secs(config.api.timeout_secs),
      limiter,
    )
  }

  /// Client for an already keyed base URL
  pub fn with_base_url(base_url: Url, timeout: Duration, limiter: RateLimiter) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("tipple/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      limiter,
    })
  }

  /// `https://host/api/json/v1/` + key -> `https://host/api/json/v1/{key}/`
  fn base_url(root: &str, api_key: &str) -> Result<Url> {
    let root = if root.ends_with('/') {
      root.to_string()
    } else {
      format!("{}/", root)
    };
    Url::parse(&root)
      .and_then(|url| url.join(&format!("{}/", api_key)))
      .map_err(|e| eyre!("Invalid API URL {}: {}", root, e))
  }

  pub fn endpoint(&self) -> &Url {
    &self.base_url
  }

  pub fn limiter(&self) -> &RateLimiter {
    &self.limiter
  }

  async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, &str)],
  ) -> Result<Vec<T>, TransportError> {
    let url = self.base_url.join(path)?;
    let request = self.http.get(url).query(query).build()?;
    debug!(path, ?query, "GET");

    let response = self.limiter.execute(&self.http, request).await?;
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
      let text = String::from_utf8_lossy(&body);
      return Err(TransportError::Status {
        code: status.as_u16(),
        body: text.chars().take(MAX_ERROR_BODY).collect(),
      });
    }

    // Some endpoints answer an unknown filter with an empty body
    if body.iter().all(u8::is_ascii_whitespace) {
      return Ok(Vec::new());
    }

    let parsed: ApiDrinksResponse<T> = serde_json::from_slice(&body)?;
    Ok(parsed.drinks)
  }

  /// List all drink categories
  pub async fn categories(&self) -> Result<Vec<Category>, TransportError> {
    let items: Vec<ApiCategory> = self.get("list.php", &[("c", "list")]).await?;
    Ok(items.into_iter().map(Category::from).collect())
  }

  /// Drinks in a category
  pub async fn filter_by_category(&self, category: &str) -> Result<Vec<DrinkSummary>, TransportError> {
    let items: Vec<ApiDrinkSummary> = self.get("filter.php", &[("c", category)]).await?;
    Ok(items.into_iter().map(DrinkSummary::from).collect())
  }

  /// Search drinks by name
  pub async fn search_by_name(&self, name: &str) -> Result<Vec<Drink>, TransportError> {
    let items: Vec<ApiDrink> = self.get("search.php", &[("s", name)]).await?;
    Ok(items.into_iter().map(ApiDrink::into_drink).collect())
  }

  /// Drinks containing an ingredient
  pub async fn filter_by_ingredient(
    &self,
    ingredient: &str,
  ) -> Result<Vec<DrinkSummary>, TransportError> {
    let items: Vec<ApiDrinkSummary> = self.get("filter.php", &[("i", ingredient)]).await?;
    Ok(items.into_iter().map(DrinkSummary::from).collect())
  }

  /// Full recipe by id
  pub async fn lookup(&self, id: &str) -> Result<Option<Drink>, TransportError> {
    let items: Vec<ApiDrink> = self.get("lookup.php", &[("i", id)]).await?;
    Ok(items.into_iter().next().map(ApiDrink::into_drink))
  }

  /// List all ingredients
  pub async fn ingredients(&self) -> Result<Vec<Ingredient>, TransportError> {
    let items: Vec<ApiIngredient> = self.get("list.php", &[("i", "list")]).await?;
    Ok(items.into_iter().map(Ingredient::from).collect())
  }

  /// A random recipe
  pub async fn random(&self) -> Result<Option<Drink>, TransportError> {
    let items: Vec<ApiDrink> = self.get("random.php", &[]).await?;
    Ok(items.into_iter().next().map(ApiDrink::into_drink))
  }

  /// Drinks whose name starts with `letter`
  pub async fn search_by_first_letter(&self, letter: char) -> Result<Vec<Drink>, TransportError> {
    let letter = letter.to_string();
    let items: Vec<ApiDrink> = self.get("search.php", &[("f", &letter)]).await?;
    Ok(items.into_iter().map(ApiDrink::into_drink).collect())
  }
}
