//! Cache-first access to drinks, plus favorites and cache maintenance.
//!
//! Every operation resolves to a [`Resource`]: failures have already been
//! classified into an `ApiError` by the time they reach the caller.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use super::cache::CocktailQueryKey;
use super::client::CocktailClient;
use super::types::{Category, Drink, DrinkSummary, Favorite, Ingredient};
use crate::cache::{CacheLayer, CacheResult, CacheStats, CacheStorage};
use crate::db::{Database, CACHE_CLEARED_AT, LAST_CATEGORY, LAST_INGREDIENT};
use crate::net::{ApiError, ApiErrorKind, ErrorMapper, RetryHandler, TransportError};
use crate::resource::Resource;

pub struct CocktailRepository<S: CacheStorage> {
  client: CocktailClient,
  cache: CacheLayer<S>,
  retry: RetryHandler,
  db: Arc<Database>,
}

impl<S: CacheStorage> CocktailRepository<S> {
  pub fn new(
    client: CocktailClient,
    cache: CacheLayer<S>,
    retry: RetryHandler,
    db: Arc<Database>,
  ) -> Self {
    Self {
      client,
      cache,
      retry,
      db,
    }
  }

  pub fn client(&self) -> &CocktailClient {
    &self.client
  }

  pub fn db(&self) -> &Database {
    &self.db
  }

  /// Run a client call with retries, classifying its failures. Fails
  /// without a request while the monitor reports offline.
  async fn remote<T, F, Fut>(&self, endpoint: &'static str, call: F) -> Result<T, ApiError>
  where
    F: Fn(CocktailClient) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
  {
    if !self.cache.is_online() {
      return Err(ApiError::new(
        ApiErrorKind::Network,
        format!("{}: offline", endpoint),
      ));
    }

    self
      .retry
      .execute(|| {
        let pending = call(self.client.clone());
        async move {
          pending
            .await
            .map_err(|e| ErrorMapper::map(e, Some(endpoint)))
        }
      })
      .await
  }

  pub async fn categories(&self) -> Resource<CacheResult<Vec<Category>>> {
    let result = self
      .cache
      .fetch_list(&CocktailQueryKey::Categories, || {
        self.remote("list.php", |c| async move { c.categories().await })
      })
      .await;
    finish("categories", result)
  }

  /// Drinks in `category`. Remembers the category for next time.
  pub async fn drinks_by_category(&self, category: &str) -> Resource<CacheResult<Vec<DrinkSummary>>> {
    let category = category.trim();
    if category.is_empty() {
      return Resource::Error(invalid_input("category name is empty"));
    }

    let key = CocktailQueryKey::ByCategory {
      category: category.to_string(),
    };
    let result = self
      .cache
      .fetch_list(&key, || {
        self.remote("filter.php", move |c| async move {
          c.filter_by_category(category).await
        })
      })
      .await;

    if result.is_ok() {
      self.remember(LAST_CATEGORY, category);
    }
    finish("drinks_by_category", result)
  }

  pub async fn search_by_name(&self, name: &str) -> Resource<CacheResult<Vec<Drink>>> {
    let name = name.trim();
    if name.is_empty() {
      return Resource::Error(invalid_input("search term is empty"));
    }

    let key = CocktailQueryKey::SearchName {
      name: name.to_string(),
    };
    let result = self
      .cache
      .fetch_list(&key, || {
        self.remote("search.php", move |c| async move { c.search_by_name(name).await })
      })
      .await;
    finish("search_by_name", result)
  }

  /// Drinks containing `ingredient`. Remembers the ingredient for next time.
  pub async fn drinks_by_ingredient(
    &self,
    ingredient: &str,
  ) -> Resource<CacheResult<Vec<DrinkSummary>>> {
    let ingredient = ingredient.trim();
    if ingredient.is_empty() {
      return Resource::Error(invalid_input("ingredient name is empty"));
    }

    let key = CocktailQueryKey::ByIngredient {
      ingredient: ingredient.to_string(),
    };
    let result = self
      .cache
      .fetch_list(&key, || {
        self.remote("filter.php", move |c| async move {
          c.filter_by_ingredient(ingredient).await
        })
      })
      .await;

    if result.is_ok() {
      self.remember(LAST_INGREDIENT, ingredient);
    }
    finish("drinks_by_ingredient", result)
  }

  pub async fn ingredients(&self) -> Resource<CacheResult<Vec<Ingredient>>> {
    let result = self
      .cache
      .fetch_list(&CocktailQueryKey::Ingredients, || {
        self.remote("list.php", |c| async move { c.ingredients().await })
      })
      .await;
    finish("ingredients", result)
  }

  pub async fn search_by_first_letter(&self, letter: char) -> Resource<CacheResult<Vec<Drink>>> {
    if !letter.is_ascii_alphanumeric() {
      return Resource::Error(invalid_input(format!("'{}' is not a letter or digit", letter)));
    }

    let key = CocktailQueryKey::FirstLetter { letter };
    let result = self
      .cache
      .fetch_list(&key, || {
        self.remote("search.php", move |c| async move {
          c.search_by_first_letter(letter).await
        })
      })
      .await;
    finish("search_by_first_letter", result)
  }

  /// Full recipe by id
  pub async fn drink(&self, id: &str) -> Resource<CacheResult<Drink>> {
    finish("drink", self.fetch_drink(id.trim()).await)
  }

  async fn fetch_drink(&self, id: &str) -> Result<CacheResult<Drink>, ApiError> {
    if id.is_empty() {
      return Err(invalid_input("drink id is empty"));
    }

    self
      .cache
      .fetch_one(id, || async move {
        self
          .remote("lookup.php", move |c| async move { c.lookup(id).await })
          .await?
          .ok_or_else(|| ApiError::not_found(format!("drink {} does not exist", id)))
      })
      .await
  }

  /// Drop the cached copy of a recipe and fetch it again.
  pub async fn refresh(&self, id: &str) -> Resource<CacheResult<Drink>> {
    let id = id.trim();
    if let Err(e) = self.cache.storage().invalidate::<Drink>(Some(id)) {
      return finish("refresh", Err(e.into()));
    }
    finish("refresh", self.fetch_drink(id).await)
  }

  /// A random recipe. Always hits the network; the result is cached by id.
  pub async fn random(&self) -> Resource<Drink> {
    let result = async {
      let drink = self
        .remote("random.php", |c| async move { c.random().await })
        .await?
        .ok_or_else(|| ApiError::not_found("no random drink returned"))?;
      self.cache.save(&drink)?;
      Ok::<_, ApiError>(drink)
    }
    .await;
    finish("random", result)
  }

  // ==========================================================================
  // Favorites
  // ==========================================================================

  /// Mark a drink as favorite, resolving its name through the cache.
  pub async fn add_favorite(&self, id: &str) -> Resource<DrinkSummary> {
    let result = async {
      let drink = self.fetch_drink(id.trim()).await?.data.summary();
      self.db.add_favorite(&drink, self.now())?;
      info!(id = %drink.id, "Added favorite");
      Ok::<_, ApiError>(drink)
    }
    .await;
    finish("add_favorite", result)
  }

  /// Returns whether the drink was a favorite.
  pub fn remove_favorite(&self, id: &str) -> Resource<bool> {
    let result = self.db.remove_favorite(id.trim()).map_err(ApiError::from);
    finish("remove_favorite", result)
  }

  /// Flip the favorite state of a drink. Returns the new state.
  ///
  /// Removal is a single delete; only a drink that was not a favorite is
  /// looked up and added.
  pub async fn toggle_favorite(&self, id: &str) -> Resource<bool> {
    let id = id.trim();
    match self.db.remove_favorite(id) {
      Ok(true) => {
        info!(id, "Removed favorite");
        Resource::Success(false)
      }
      Ok(false) => self.add_favorite(id).await.map(|_| true),
      Err(e) => finish("toggle_favorite", Err(e.into())),
    }
  }

  pub fn favorites(&self) -> Resource<Vec<Favorite>> {
    finish("favorites", self.db.favorites().map_err(ApiError::from))
  }

  // ==========================================================================
  // Cache maintenance
  // ==========================================================================

  /// Delete every cached record and note when it happened.
  pub fn clear_cache(&self) -> Resource<()> {
    let result = self.cache.storage().clear().and_then(|()| {
      self
        .db
        .set_preference(CACHE_CLEARED_AT, &self.now().to_string())
    });
    if result.is_ok() {
      info!("Cache cleared");
    }
    finish("clear_cache", result.map_err(ApiError::from))
  }

  /// Delete stale records. Returns the number of entities removed.
  pub fn clear_stale(&self) -> Resource<usize> {
    let result = self.cache.storage().clear_stale();
    if let Ok(removed) = result {
      info!(removed, "Stale cache records cleared");
    }
    finish("clear_stale", result.map_err(ApiError::from))
  }

  /// Force-expire one drink, or every cached record when `id` is `None`.
  pub fn invalidate(&self, id: Option<&str>) -> Resource<usize> {
    let storage = self.cache.storage();
    let result = match id.map(str::trim) {
      Some(id) => storage
        .invalidate::<Drink>(Some(id))
        .and_then(|n| Ok(n + storage.invalidate::<DrinkSummary>(Some(id))?)),
      None => storage.invalidate::<Drink>(None).and_then(|drinks| {
        Ok(
          drinks
            + storage.invalidate::<DrinkSummary>(None)?
            + storage.invalidate::<Category>(None)?
            + storage.invalidate::<Ingredient>(None)?,
        )
      }),
    };
    finish("invalidate", result.map_err(ApiError::from))
  }

  /// Every cached recipe, fresh or not
  pub fn cached_drinks(&self) -> Resource<Vec<Drink>> {
    let result = self
      .cache
      .storage()
      .get_all::<Drink>()
      .map(|cached| cached.into_iter().map(|c| c.entity).collect::<Vec<_>>());
    finish("cached_drinks", result.map_err(ApiError::from))
  }

  pub fn cache_stats(&self) -> Resource<CacheStats> {
    finish("cache_stats", self.cache.storage().stats().map_err(ApiError::from))
  }

  /// When the cache was last cleared (epoch millis)
  pub fn cache_cleared_at(&self) -> Option<i64> {
    self
      .db
      .preference(CACHE_CLEARED_AT)
      .ok()
      .flatten()
      .and_then(|v| v.parse().ok())
  }

  fn now(&self) -> i64 {
    self.cache.storage().policy().now()
  }

  fn remember(&self, key: &str, value: &str) {
    if let Err(e) = self.db.set_preference(key, value) {
      warn!(key, error = %e, "Failed to store preference");
    }
  }
}

fn invalid_input(message: impl Into<String>) -> ApiError {
  ApiError::new(ApiErrorKind::Client, message).with_code(400)
}

/// Log the failure and wrap the outcome.
fn finish<T>(operation: &str, result: Result<T, ApiError>) -> Resource<T> {
  if let Err(e) = &result {
    warn!(
      operation,
      kind = %e.kind(),
      code = ?e.code(),
      retryable = e.is_retryable(),
      transient = e.is_transient(),
      message = e.message(),
      "Operation failed"
    );
  }
  Resource::from(result)
}
