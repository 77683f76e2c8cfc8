//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::{ApiError, TransportError};
use super::monitor::NetworkMonitor;
use crate::config::RetryConfig;

/// Failures that may carry a classified `ApiError`.
pub trait Classified {
  fn classified(&self) -> Option<&ApiError>;
}

impl Classified for ApiError {
  fn classified(&self) -> Option<&ApiError> {
    Some(self)
  }
}

impl Classified for TransportError {
  fn classified(&self) -> Option<&ApiError> {
    None
  }
}

impl Classified for color_eyre::Report {
  fn classified(&self) -> Option<&ApiError> {
    self.downcast_ref::<ApiError>()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from(&RetryConfig::default())
  }
}

impl From<&RetryConfig> for RetryPolicy {
  fn from(config: &RetryConfig) -> Self {
    Self {
      max_attempts: config.max_attempts.max(1),
      initial_delay: Duration::from_millis(config.initial_delay_ms),
      max_delay: Duration::from_millis(config.max_delay_ms),
    }
  }
}

impl RetryPolicy {
  /// Delay before the retry following `failed_attempts` failures (1-based).
  pub fn delay_for(&self, failed_attempts: u32) -> Duration {
    let factor = 1u32
      .checked_shl(failed_attempts.saturating_sub(1))
      .unwrap_or(u32::MAX);
    self
      .initial_delay
      .checked_mul(factor)
      .unwrap_or(self.max_delay)
      .min(self.max_delay)
  }
}

/// Runs remote operations with bounded retries.
#[derive(Clone)]
pub struct RetryHandler {
  policy: RetryPolicy,
  monitor: Arc<NetworkMonitor>,
}

impl RetryHandler {
  pub fn new(policy: RetryPolicy, monitor: Arc<NetworkMonitor>) -> Self {
    Self { policy, monitor }
  }

  /// Run `operation`, retrying while `should_retry` approves and attempts remain.
  ///
  /// The last failure is returned unchanged.
  pub async fn execute_with_retry<T, E, F, Fut, P>(
    &self,
    mut operation: F,
    should_retry: P,
  ) -> Result<T, E>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
  {
    let mut attempt = 0;
    loop {
      attempt += 1;
      let err = match operation().await {
        Ok(value) => return Ok(value),
        Err(err) => err,
      };

      if attempt >= self.policy.max_attempts {
        warn!(attempt, error = %err, "Giving up after final attempt");
        return Err(err);
      }
      if !should_retry(&err) {
        debug!(attempt, error = %err, "Failure is not retryable");
        return Err(err);
      }

      let delay = self.policy.delay_for(attempt);
      warn!(
        attempt,
        delay_ms = delay.as_millis() as u64,
        error = %err,
        "Attempt failed, retrying"
      );
      tokio::time::sleep(delay).await;
    }
  }

  /// Run `operation` with the default retry predicate.
  pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classified + Display,
  {
    self
      .execute_with_retry(operation, |err| self.should_retry(err))
      .await
  }

  /// Classified failures are retried when transient; anything else is
  /// retried only while the network looks available.
  pub fn should_retry<E: Classified>(&self, err: &E) -> bool {
    match err.classified() {
      Some(api) => api.is_transient(),
      None => self.monitor.is_available(),
    }
  }
}
