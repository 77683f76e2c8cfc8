//! Error taxonomy for remote calls.
//!
//! Raw failures from the transport (`TransportError`) are classified by
//! `ErrorMapper` into an `ApiError` carrying a closed `ApiErrorKind`, a
//! retryable flag and a user-facing message that never exposes internals.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use super::rate_limit::RateLimitError;

/// Closed set of API error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
  Network,
  Server,
  Client,
  NotFound,
  Auth,
  ServiceUnavailable,
  Generic,
}

impl ApiErrorKind {
  /// Canned copy shown to users for each kind.
  pub fn user_message(self) -> &'static str {
    match self {
      Self::Network => "Unable to connect. Check your internet connection and try again.",
      Self::Server => "The cocktail service is having problems. Please try again later.",
      Self::Client => "The request could not be processed.",
      Self::NotFound => "Nothing was found for that request.",
      Self::Auth => "Access to the cocktail service was denied.",
      Self::ServiceUnavailable => {
        "The cocktail service is busy right now. Please wait a moment and try again."
      }
      Self::Generic => "Something went wrong. Please try again.",
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Server => "server",
      Self::Client => "client",
      Self::NotFound => "not_found",
      Self::Auth => "auth",
      Self::ServiceUnavailable => "service_unavailable",
      Self::Generic => "generic",
    }
  }
}

impl fmt::Display for ApiErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A classified API failure. Immutable once built.
#[derive(Debug, Clone)]
pub struct ApiError {
  kind: ApiErrorKind,
  message: String,
  code: Option<u16>,
  retryable: bool,
  source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl ApiError {
  pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      code: None,
      retryable: false,
      source: None,
    }
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(ApiErrorKind::NotFound, message).with_code(404)
  }

  pub fn generic(message: impl Into<String>) -> Self {
    Self::new(ApiErrorKind::Generic, message)
  }

  pub fn with_code(mut self, code: u16) -> Self {
    self.code = Some(code);
    self
  }

  pub fn with_retryable(mut self, retryable: bool) -> Self {
    self.retryable = retryable;
    self
  }

  pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
    self.source = Some(Arc::new(source));
    self
  }

  pub fn kind(&self) -> ApiErrorKind {
    self.kind
  }

  /// Technical message, suitable for logs.
  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn code(&self) -> Option<u16> {
    self.code
  }

  pub fn is_retryable(&self) -> bool {
    self.retryable
  }

  pub fn user_message(&self) -> &'static str {
    self.kind.user_message()
  }

  /// True for failures that may go away on their own.
  pub fn is_transient(&self) -> bool {
    self.retryable
      || matches!(
        self.kind,
        ApiErrorKind::Network | ApiErrorKind::ServiceUnavailable
      )
  }
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.code {
      Some(code) => write!(f, "{} error ({}): {}", self.kind, code, self.message),
      None => write!(f, "{} error: {}", self.kind, self.message),
    }
  }
}

impl StdError for ApiError {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    self
      .source
      .as_deref()
      .map(|e| e as &(dyn StdError + 'static))
  }
}

/// Storage and setup failures reaching a repository call surface as generic errors.
impl From<color_eyre::Report> for ApiError {
  fn from(report: color_eyre::Report) -> Self {
    match report.downcast::<ApiError>() {
      Ok(api) => api,
      Err(report) => ApiError::generic(format!("{:#}", report)),
    }
  }
}

/// Raw failures produced by the HTTP client and its interceptor.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("HTTP {code}: {body}")]
  Status { code: u16, body: String },

  #[error("failed to decode response: {0}")]
  Decode(#[from] serde_json::Error),

  #[error(transparent)]
  RateLimit(#[from] RateLimitError),

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("invalid URL: {0}")]
  Url(#[from] url::ParseError),

  #[error("request cannot be replayed")]
  NotReplayable,
}

/// Classifies raw transport failures.
pub struct ErrorMapper;

impl ErrorMapper {
  /// Map a raw failure into an `ApiError`, optionally labelled with the endpoint.
  pub fn map(error: TransportError, endpoint: Option<&str>) -> ApiError {
    let label = |detail: String| match endpoint {
      Some(endpoint) => format!("{}: {}", endpoint, detail),
      None => detail,
    };

    let mapped = match &error {
      TransportError::Http(e) if e.is_timeout() => {
        ApiError::new(ApiErrorKind::Network, label("request timed out".into())).with_retryable(true)
      }
      TransportError::Http(e) if e.is_connect() => {
        ApiError::new(ApiErrorKind::Network, label("unable to reach host".into()))
          .with_retryable(true)
      }
      TransportError::Http(e) if e.is_status() => match e.status() {
        Some(status) => Self::from_status(status.as_u16(), label(e.to_string())),
        None => ApiError::generic(label(e.to_string())),
      },
      TransportError::Http(e) if e.is_decode() => ApiError::generic(label(e.to_string())),
      TransportError::Http(e) if e.is_request() || e.is_body() => ApiError::new(
        ApiErrorKind::Network,
        label(format!("network I/O failed: {}", e)),
      )
      .with_retryable(true),
      TransportError::Http(e) => ApiError::generic(label(e.to_string())),
      TransportError::Status { code, body } => {
        Self::from_status(*code, label(format!("HTTP {}: {}", code, body)))
      }
      TransportError::Io(e) => Self::from_io(e, label),
      TransportError::RateLimit(RateLimitError::Exceeded { retries }) => ApiError::new(
        ApiErrorKind::ServiceUnavailable,
        label(format!("rate limit exceeded after {} backoffs", retries)),
      )
      .with_code(429)
      .with_retryable(true),
      TransportError::RateLimit(e) => ApiError::generic(label(e.to_string())),
      TransportError::Decode(e) => ApiError::generic(label(format!("invalid response: {}", e))),
      TransportError::Url(e) => ApiError::generic(label(format!("invalid URL: {}", e))),
      TransportError::NotReplayable => ApiError::generic(label(error.to_string())),
    };

    mapped.with_source(error)
  }

  /// Classify an HTTP status code.
  pub fn from_status(code: u16, message: impl Into<String>) -> ApiError {
    let kind = match code {
      401 | 403 => ApiErrorKind::Auth,
      404 => ApiErrorKind::NotFound,
      429 => ApiErrorKind::ServiceUnavailable,
      400..=499 => ApiErrorKind::Client,
      500..=599 => ApiErrorKind::Server,
      _ => ApiErrorKind::Generic,
    };
    ApiError::new(kind, message)
      .with_code(code)
      .with_retryable(code == 429 || code >= 500)
  }

  fn from_io(error: &io::Error, label: impl Fn(String) -> String) -> ApiError {
    let message = match error.kind() {
      io::ErrorKind::TimedOut => label("connection timed out".into()),
      io::ErrorKind::ConnectionRefused
      | io::ErrorKind::ConnectionReset
      | io::ErrorKind::ConnectionAborted
      | io::ErrorKind::NotConnected
      | io::ErrorKind::AddrNotAvailable => label("unable to reach host".into()),
      _ => label(format!("network I/O failed: {}", error)),
    };
    ApiError::new(ApiErrorKind::Network, message).with_retryable(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn status(code: u16) -> ApiError {
    ErrorMapper::map(
      TransportError::Status {
        code,
        body: String::new(),
      },
      Some("search.php"),
    )
  }

  #[test]
  fn test_status_codes_map_to_kinds() {
    let too_many = status(429);
    assert_eq!(too_many.kind(), ApiErrorKind::ServiceUnavailable);
    assert!(too_many.is_retryable());

    let missing = status(404);
    assert_eq!(missing.kind(), ApiErrorKind::NotFound);
    assert!(!missing.is_retryable());

    let server = status(500);
    assert_eq!(server.kind(), ApiErrorKind::Server);
    assert!(server.is_retryable());
    assert_eq!(server.code(), Some(500));

    assert_eq!(status(401).kind(), ApiErrorKind::Auth);
    assert_eq!(status(403).kind(), ApiErrorKind::Auth);
    assert_eq!(status(400).kind(), ApiErrorKind::Client);
    assert!(!status(418).is_retryable());
    assert_eq!(status(503).kind(), ApiErrorKind::Server);
    assert_eq!(status(302).kind(), ApiErrorKind::Generic);
  }

  #[test]
  fn test_endpoint_label_prefixes_message() {
    let err = status(500);
    assert!(err.message().starts_with("search.php: "));
    assert!(err.source().is_some());
  }

  #[test]
  fn test_io_errors_are_retryable_network() {
    let timeout = ErrorMapper::map(
      TransportError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")),
      None,
    );
    assert_eq!(timeout.kind(), ApiErrorKind::Network);
    assert!(timeout.is_retryable());
    assert_eq!(timeout.message(), "connection timed out");

    let other = ErrorMapper::map(
      TransportError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")),
      None,
    );
    assert_eq!(other.kind(), ApiErrorKind::Network);
    assert!(other.is_retryable());
    assert!(other.message().contains("pipe closed"));
  }

  #[test]
  fn test_rate_limit_exhaustion_is_service_unavailable() {
    let err = ErrorMapper::map(
      TransportError::RateLimit(RateLimitError::Exceeded { retries: 3 }),
      None,
    );
    assert_eq!(err.kind(), ApiErrorKind::ServiceUnavailable);
    assert_eq!(err.code(), Some(429));
    assert!(err.is_retryable());
  }

  #[test]
  fn test_decode_failures_are_not_retryable() {
    let decode = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
    let err = ErrorMapper::map(TransportError::Decode(decode), None);
    assert_eq!(err.kind(), ApiErrorKind::Generic);
    assert!(!err.is_retryable());
    assert!(!err.is_transient());
  }

  #[test]
  fn test_transient_includes_network_kinds() {
    let err = ApiError::new(ApiErrorKind::ServiceUnavailable, "busy");
    assert!(!err.is_retryable());
    assert!(err.is_transient());
    assert!(!ApiError::not_found("gone").is_transient());
  }

  #[test]
  fn test_user_message_is_per_kind() {
    let a = status(500);
    let b = ApiError::new(ApiErrorKind::Server, "different detail");
    assert_eq!(a.user_message(), b.user_message());
    assert_ne!(a.user_message(), status(404).user_message());
    assert!(!a.user_message().contains("search.php"));
  }

  #[test]
  fn test_report_conversion_keeps_api_errors() {
    let report = color_eyre::Report::new(ApiError::not_found("drink 1"));
    let err = ApiError::from(report);
    assert_eq!(err.kind(), ApiErrorKind::NotFound);

    let err = ApiError::from(color_eyre::eyre::eyre!("disk full"));
    assert_eq!(err.kind(), ApiErrorKind::Generic);
    assert!(err.message().contains("disk full"));
  }
}
