use chrono::Duration as CacheDuration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::client::CoordinatorConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub loader: LoaderConfig,
  #[serde(default)]
  pub pagination: PaginationConfig,
  #[serde(default)]
  pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// Base URL that relative resources are resolved against
  pub base_url: Option<Url>,
  /// Headers sent with every request (e.g. Accept, User-Agent)
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
  pub cache_ttl_secs: u64,
  pub max_cache_size: usize,
  pub concurrent_limit: usize,
  pub request_timeout_secs: u64,
  /// Interval of the background sweep of expired responses
  pub cleanup_interval_secs: u64,
}

impl Default for LoaderConfig {
  fn default() -> Self {
    Self {
      cache_ttl_secs: 300,
      max_cache_size: 100,
      concurrent_limit: 3,
      request_timeout_secs: 10,
      cleanup_interval_secs: 600,
    }
  }
}

impl LoaderConfig {
  pub fn cleanup_interval(&self) -> Duration {
    Duration::from_secs(self.cleanup_interval_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
  pub page_size: u32,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    Self { page_size: 20 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
  pub ttl_secs: u64,
  /// Database file; defaults to the data directory
  pub path: Option<PathBuf>,
}

impl Default for SnapshotConfig {
  fn default() -> Self {
    Self {
      ttl_secs: 300,
      path: None,
    }
  }
}

impl SnapshotConfig {
  pub fn ttl(&self) -> CacheDuration {
    CacheDuration::seconds(self.ttl_secs as i64)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dataloader.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dataloader/config.yaml
  ///
  /// Without any file the defaults are used.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("dataloader.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dataloader").join("config.yaml");
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

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.loader.concurrent_limit == 0 {
      return Err(eyre!("loader.concurrent_limit must be at least 1"));
    }
    if self.loader.max_cache_size == 0 {
      return Err(eyre!("loader.max_cache_size must be at least 1"));
    }
    if self.pagination.page_size == 0 {
      return Err(eyre!("pagination.page_size must be at least 1"));
    }
    Ok(())
  }

  /// Settings for a [`RequestCoordinator`](crate::client::RequestCoordinator).
  pub fn coordinator(&self) -> CoordinatorConfig {
    CoordinatorConfig {
      cache_ttl: CacheDuration::seconds(self.loader.cache_ttl_secs as i64),
      max_cache_size: self.loader.max_cache_size,
      concurrent_limit: self.loader.concurrent_limit,
      request_timeout: Duration::from_secs(self.loader.request_timeout_secs),
      base_url: self.api.base_url.clone(),
      default_headers: self
        .api
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
    }
  }
}
