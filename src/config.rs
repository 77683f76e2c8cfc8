use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://www.thecocktaildb.com/api/json/v1/";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub rate_limit: RateLimitConfig,
  pub retry: RetryConfig,
  pub cache: CacheConfig,
  pub network: NetworkConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// API root without the key segment; the key is appended as the last path segment
  pub url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
      timeout_secs: 15,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
  /// Starting budget; replaced by the server's X-RateLimit-Limit when sent
  pub max_calls_per_minute: u32,
  pub base_backoff_ms: u64,
  pub max_backoff_ms: u64,
  /// Upper bound of the random jitter added to each backoff
  pub max_jitter_ms: u64,
  /// Consecutive forced backoffs before giving up
  pub max_retries: u32,
  /// Warn when X-RateLimit-Remaining drops below this
  pub low_quota_threshold: u32,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      max_calls_per_minute: 30,
      base_backoff_ms: 1_000,
      max_backoff_ms: 30_000,
      max_jitter_ms: 1_000,
      max_retries: 3,
      low_quota_threshold: 5,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub initial_delay_ms: u64,
  pub max_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_delay_ms: 1_000,
      max_delay_ms: 10_000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// When false, nothing is read from or written to the cache
  pub enabled: bool,
  pub ttl_hours: u64,
  /// Database location (defaults to $XDG_DATA_HOME/tipple/tipple.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_hours: 24,
      path: None,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_hours.saturating_mul(60 * 60))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub probe_interval_secs: u64,
  pub probe_timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 15,
      probe_timeout_secs: 3,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive, overridden by RUST_LOG
  pub level: String,
  /// Log directory (defaults to $XDG_DATA_HOME/tipple/logs)
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tipple.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tipple/config.yaml
  ///
  /// Falls back to defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tipple.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tipple").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not to an empty mapping
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Get the API key from environment variables.
  ///
  /// Checks TIPPLE_API_KEY, falling back to the public test key "1".
  pub fn api_key() -> String {
    std::env::var("TIPPLE_API_KEY")
      .ok()
      .filter(|key| !key.trim().is_empty())
      .unwrap_or_else(|| "1".to_string())
  }

  /// Directory for the cache database and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("tipple"))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(path) => Ok(path.clone()),
      None => Ok(Self::data_dir()?.join("tipple.db")),
    }
  }

  pub fn log_dir(&self) -> Result<PathBuf> {
    match &self.log.directory {
      Some(dir) => Ok(dir.clone()),
      None => Ok(Self::data_dir()?.join("logs")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.rate_limit.max_calls_per_minute, 30);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.cache.ttl(), Duration::from_secs(24 * 60 * 60));
    assert!(config.cache.enabled);
  }

  #[test]
  fn test_partial_sections_keep_other_defaults() {
    let config = Config::parse(
      r#"
rate_limit:
  max_calls_per_minute: 10
cache:
  enabled: false
"#,
    )
    .unwrap();
    assert_eq!(config.rate_limit.max_calls_per_minute, 10);
    assert_eq!(config.rate_limit.base_backoff_ms, 1_000);
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.ttl_hours, 24);
    assert_eq!(config.api.url, DEFAULT_API_URL);
  }

  #[test]
  fn test_huge_ttl_saturates() {
    let config = Config::parse("cache:\n  ttl_hours: 18446744073709551615\n").unwrap();
    assert_eq!(config.cache.ttl(), Duration::from_secs(u64::MAX));
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/tipple.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tipple.yaml");
    std::fs::write(&path, "retry:\n  max_attempts: 5\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.retry.max_attempts, 5);
  }
}
