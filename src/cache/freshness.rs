//! TTL-based freshness decisions for cached records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::clock::{Clock, SystemClock};

/// Default time-to-live for cached records.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Decides whether a record stamped at `last_updated` is still fresh.
///
/// A record is fresh while its age is strictly below the TTL; a record
/// exactly TTL old is stale.
#[derive(Clone)]
pub struct FreshnessPolicy {
  ttl_millis: i64,
  clock: Arc<dyn Clock>,
}

impl FreshnessPolicy {
  pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
    Self {
      ttl_millis: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
      clock,
    }
  }

  pub fn now(&self) -> i64 {
    self.clock.now_millis()
  }

  /// Records stamped at or before this instant are stale.
  pub fn cutoff(&self) -> i64 {
    self.now().saturating_sub(self.ttl_millis)
  }

  pub fn is_fresh(&self, last_updated: i64) -> bool {
    last_updated > self.cutoff()
  }

  /// Timestamp that makes a record stale immediately.
  pub fn expired_stamp(&self) -> i64 {
    self.cutoff().saturating_sub(1)
  }
}

impl Default for FreshnessPolicy {
  fn default() -> Self {
    Self::new(DEFAULT_TTL, Arc::new(SystemClock))
  }
}

/// Convert an epoch-millis stamp for display.
pub fn to_datetime(millis: i64) -> Option<DateTime<Utc>> {
  DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::ManualClock;

  const HOUR: i64 = 60 * 60 * 1000;

  #[test]
  fn test_ttl_boundary() {
    let clock = ManualClock::new(100 * HOUR);
    let policy = FreshnessPolicy::new(DEFAULT_TTL, clock.clone());

    assert!(policy.is_fresh(100 * HOUR));
    assert!(policy.is_fresh(76 * HOUR + 1));
    // Exactly 24h old is stale
    assert!(!policy.is_fresh(76 * HOUR));
    assert!(!policy.is_fresh(75 * HOUR));
    assert!(!policy.is_fresh(policy.expired_stamp()));

    clock.advance(HOUR);
    assert!(!policy.is_fresh(77 * HOUR));
  }

  #[test]
  fn test_datetime_conversion() {
    let dt = to_datetime(0).unwrap();
    assert_eq!(dt.timestamp(), 0);
  }
}
