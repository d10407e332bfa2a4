use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Longest accepted cache freshness window (ten years).
pub const MAX_TTL_DAYS: u64 = 3650;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub batch: BatchConfig,
  /// Where the local database and logs live (defaults to $XDG_DATA_HOME/cbsbooks)
  pub data_dir: Option<PathBuf>,
  /// Initial value of the offline override; a persisted choice takes precedence
  #[serde(default)]
  pub force_offline: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the deployment, e.g. https://books.example.com or
  /// https://example.com/books (API paths are resolved below it)
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Freshness window for cached collection lists
  #[serde(default = "default_ttl_days")]
  pub ttl_days: u64,
  /// Byte quota of the small record tier
  #[serde(default = "default_record_quota")]
  pub record_quota_bytes: u64,
  /// Byte quota of the large blob tier
  #[serde(default = "default_blob_quota")]
  pub blob_quota_bytes: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_days: default_ttl_days(),
      record_quota_bytes: default_record_quota(),
      blob_quota_bytes: default_blob_quota(),
    }
  }
}

impl CacheConfig {
  /// Freshness window, capped at [`MAX_TTL_DAYS`].
  pub fn ttl(&self) -> chrono::Duration {
    chrono::Duration::days(self.ttl_days.min(MAX_TTL_DAYS) as i64)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
  /// Concurrent requests per window for bulk adds
  #[serde(default = "default_add_window")]
  pub add_window: usize,
  /// Concurrent requests per window for bulk deletes
  #[serde(default = "default_delete_window")]
  pub delete_window: usize,
}

impl Default for BatchConfig {
  fn default() -> Self {
    Self {
      add_window: default_add_window(),
      delete_window: default_delete_window(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_ttl_days() -> u64 {
  7
}

fn default_record_quota() -> u64 {
  5 * MIB
}

fn default_blob_quota() -> u64 {
  256 * MIB
}

fn default_add_window() -> usize {
  5
}

fn default_delete_window() -> usize {
  10
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cbsbooks.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cbsbooks/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/cbsbooks/config.yaml \
         with at least `api: {{ url: ... }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("cbsbooks.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cbsbooks").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse and normalize a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let mut config: Config = serde_yaml::from_str(contents)?;
    url::Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid api.url '{}': {}", config.api.url, e))?;
    if config.cache.ttl_days > MAX_TTL_DAYS {
      return Err(eyre!(
        "cache.ttl_days must be at most {} (got {})",
        MAX_TTL_DAYS,
        config.cache.ttl_days
      ));
    }
    config.batch.add_window = config.batch.add_window.max(1);
    config.batch.delete_window = config.batch.delete_window.max(1);
    Ok(config)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  /// Resolve the data directory.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;
    Ok(data_dir.join("cbsbooks"))
  }

  /// Get the API token from environment variables, if any.
  ///
  /// Checks CBSBOOKS_API_TOKEN first, then CBS_API_TOKEN as fallback.
  pub fn api_token() -> Option<String> {
    std::env::var("CBSBOOKS_API_TOKEN")
      .or_else(|_| std::env::var("CBS_API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_applied() {
    let config = Config::from_yaml("api:\n  url: https://books.example.com\n").unwrap();
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.cache.ttl_days, 7);
    assert_eq!(config.cache.ttl(), chrono::Duration::days(7));
    assert_eq!(config.batch.add_window, 5);
    assert_eq!(config.batch.delete_window, 10);
    assert_eq!(config.force_offline, None);
  }

  #[test]
  fn test_zero_windows_are_clamped() {
    let yaml = "api:\n  url: https://books.example.com\nbatch:\n  add_window: 0\n  delete_window: 0\n";
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.batch.add_window, 1);
    assert_eq!(config.batch.delete_window, 1);
  }

  #[test]
  fn test_out_of_range_ttl() {
    let yaml = "api:\n  url: https://books.example.com\ncache:\n  ttl_days: 18446744073709551615\n";
    assert!(Config::from_yaml(yaml).is_err());

    let cache = CacheConfig {
      ttl_days: u64::MAX,
      ..CacheConfig::default()
    };
    assert_eq!(cache.ttl(), chrono::Duration::days(MAX_TTL_DAYS as i64));
  }

  #[test]
  fn test_invalid_url_rejected() {
    assert!(Config::from_yaml("api:\n  url: not a url\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    let err = Config::load(Some(Path::new("/nonexistent/cbsbooks.yaml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
  }
}
