//! Request resilience: rate limiting, retries, error classification and
//! connectivity monitoring for calls to the remote API.

mod error;
mod monitor;
mod rate_limit;
mod retry;

pub use error::{ApiError, ApiErrorKind, ErrorMapper, TransportError};
pub use monitor::{Connectivity, NetworkMonitor, TcpProbe};
pub use rate_limit::{RateLimitSnapshot, RateLimiter};
pub use retry::{RetryHandler, RetryPolicy};
