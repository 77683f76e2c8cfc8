//! Uniform outcome type for asynchronous operations.
//!
//! Every repository call resolves to a `Resource<T>`. Callers that want to
//! show progress can wrap the call with [`Resource::track`], which yields
//! `Loading` before the final value.

use std::future::Future;

use futures::{stream, Stream, StreamExt};

use crate::net::ApiError;

/// The state of an asynchronous operation
#[derive(Debug, Clone)]
pub enum Resource<T> {
  /// Operation is in flight
  Loading,
  /// Operation completed successfully
  Success(T),
  /// Operation failed
  Error(ApiError),
}

#[cfg(test)]
impl<T> Resource<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, Resource::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Resource::Success(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      Resource::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      Resource::Error(e) => Some(e),
      _ => None,
    }
  }
}

impl<T> Resource<T> {
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
    match self {
      Resource::Loading => Resource::Loading,
      Resource::Success(data) => Resource::Success(f(data)),
      Resource::Error(e) => Resource::Error(e),
    }
  }

  /// Emit `Loading`, then the outcome of `operation`.
  pub fn track<Fut>(operation: Fut) -> impl Stream<Item = Resource<T>>
  where
    Fut: Future<Output = Resource<T>>,
  {
    stream::once(async { Resource::Loading }).chain(stream::once(operation))
  }
}

impl<T> From<Result<T, ApiError>> for Resource<T> {
  fn from(result: Result<T, ApiError>) -> Self {
    match result {
      Ok(data) => Resource::Success(data),
      Err(e) => Resource::Error(e),
    }
  }
}
