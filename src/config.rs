use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::api::endpoints::default_registry;
use crate::cache::{CachePolicy, OperationRegistry};

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheConfig,
  pub search: SearchConfig,
  pub feedback: FeedbackConfig,
  pub notifications: NotificationsConfig,
  /// Overrides merged over the built-in operation table
  pub operations: OperationRegistry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
      timeout_secs: 30,
    }
  }
}

impl ApiConfig {
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.base_url).map_err(|e| eyre!("Invalid api.base_url {}: {}", self.base_url, e))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Age after which a subscribe revalidates a successful entry
  pub max_age_secs: Option<u64>,
  /// Unsubscribed entries kept around for quick re-subscription
  pub retain_idle: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_age_secs: None,
      retain_idle: 64,
    }
  }
}

impl CacheConfig {
  /// `max_age_secs` as a duration. Errors when it does not fit one.
  pub fn max_age(&self) -> Result<Option<chrono::Duration>> {
    let Some(secs) = self.max_age_secs else {
      return Ok(None);
    };
    i64::try_from(secs)
      .ok()
      .and_then(chrono::Duration::try_seconds)
      .map(Some)
      .ok_or_else(|| eyre!("cache.max_age_secs is out of range: {}", secs))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  pub default_limit: u32,
  pub history_limit: usize,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      default_limit: 10,
      history_limit: 20,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
  pub default_limit: u32,
}

impl Default for FeedbackConfig {
  fn default() -> Self {
    Self { default_limit: 50 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
  pub display_secs: u64,
}

impl Default for NotificationsConfig {
  fn default() -> Self {
    Self { display_secs: 6 }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./nexus-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/nexus-sync/config.yaml
  ///
  /// Without a file every setting takes its default.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    if let Ok(url) = std::env::var("NEXUS_API_BASE_URL") {
      config.api.base_url = url;
    }
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("nexus-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("nexus-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  pub fn validate(&self) -> Result<()> {
    self.api.base_url()?;
    if self.api.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be greater than zero"));
    }
    if self.search.default_limit == 0 || self.search.history_limit == 0 {
      return Err(eyre!("search limits must be greater than zero"));
    }
    if self.feedback.default_limit == 0 {
      return Err(eyre!("feedback.default_limit must be greater than zero"));
    }
    if self.notifications.display_secs == 0 {
      return Err(eyre!("notifications.display_secs must be greater than zero"));
    }
    if self.cache.retain_idle == 0 {
      return Err(eyre!("cache.retain_idle must be greater than zero"));
    }
    self.cache.max_age()?;
    Ok(())
  }

  /// Built-in operation table with any configured overrides applied.
  pub fn registry(&self) -> OperationRegistry {
    let mut registry = default_registry();
    registry.merge(self.operations.clone());
    registry
  }

  pub fn cache_policy(&self) -> Result<CachePolicy> {
    Ok(CachePolicy {
      max_age: self.cache.max_age()?,
      retain_idle: self.cache.retain_idle,
    })
  }

  /// Get the API bearer token from the environment.
  ///
  /// Checks NEXUS_API_TOKEN. Unset or blank means unauthenticated requests.
  pub fn get_api_token() -> Option<String> {
    std::env::var("NEXUS_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{OperationKind, Tag};

  #[test]
  fn test_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.search.default_limit, 10);
    assert_eq!(config.search.history_limit, 20);
    assert_eq!(config.feedback.default_limit, 50);
    assert_eq!(config.notifications.display_secs, 6);
    let policy = config.cache_policy().unwrap();
    assert_eq!(policy.retain_idle, 64);
    assert!(policy.max_age.is_none());
    config.validate().unwrap();
  }

  #[test]
  fn test_partial_sections() {
    let config = Config::parse(
      r#"
api:
  base_url: https://nexus.example.com/api/v1
cache:
  max_age_secs: 120
search:
  default_limit: 25
"#,
    )
    .unwrap();
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.search.default_limit, 25);
    assert_eq!(config.search.history_limit, 20);
    assert_eq!(
      config.cache_policy().unwrap().max_age,
      Some(chrono::Duration::seconds(120))
    );
  }

  #[test]
  fn test_operation_overrides_merge() {
    let config = Config::parse(
      r#"
operations:
  search:
    kind: read
    tags: [Search, Status]
  archiveFeedback:
    kind: write
    tags: [Feedback]
    required: [feedbackId]
"#,
    )
    .unwrap();
    let registry = config.registry();
    assert!(registry.provided_tags("search").unwrap().contains(&Tag::STATUS));
    assert_eq!(
      registry.get("archiveFeedback").map(|s| s.kind),
      Some(OperationKind::Write)
    );
    // Untouched entries survive
    assert!(registry.get("ingest").is_some());
  }

  #[test]
  fn test_validation_rejects_bad_values() {
    let config = Config::parse("api:\n  base_url: not a url\n").unwrap();
    assert!(config.validate().is_err());

    let config = Config::parse("search:\n  history_limit: 0\n").unwrap();
    assert!(config.validate().is_err());

    let config = Config::parse("cache:\n  retain_idle: 0\n").unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_oversized_max_age_is_rejected() {
    // Fits in u64 but not in a chrono duration
    let config = Config::parse("cache:\n  max_age_secs: 10000000000000000\n").unwrap();
    assert!(config.validate().is_err());
    assert!(config.cache_policy().is_err());

    // Would wrap negative through an i64 cast
    let config = Config::parse("cache:\n  max_age_secs: 9223372036854775808\n").unwrap();
    assert!(config.validate().is_err());
    assert!(config.cache_policy().is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/nexus-sync.yaml"))).is_err());
  }
}
