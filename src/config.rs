use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub feed: FeedConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the feed API, e.g. "https://feed.example.com/api/"
  pub url: String,
  /// Per-request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// Items requested by the first page of a feed
  #[serde(default = "default_initial_count")]
  pub initial_count: usize,
  /// Items requested by every following page
  #[serde(default = "default_more_count")]
  pub more_count: usize,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      initial_count: default_initial_count(),
      more_count: default_more_count(),
    }
  }
}

fn default_initial_count() -> usize {
  16
}

fn default_more_count() -> usize {
  8
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Default filter directive; `RUST_LOG` takes precedence
  #[serde(default = "default_level")]
  pub level: String,
  /// Write daily log files here instead of to stderr
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_level(),
      directory: None,
    }
  }
}

fn default_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./feedcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/feedcache/config.yaml
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
        "No configuration file found. Create one at ~/.config/feedcache/config.yaml\n\
         or pass --api-url."
      )),
    }
  }

  /// A configuration with defaults for everything but the API URL.
  pub fn with_api_url(url: impl Into<String>) -> Self {
    Self {
      api: ApiConfig {
        url: url.into(),
        timeout_secs: default_timeout_secs(),
      },
      feed: FeedConfig::default(),
      logging: LoggingConfig::default(),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("feedcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("feedcache").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the API token from the environment, if one is set.
  ///
  /// Reads FEEDCACHE_API_TOKEN. Requests are sent without auth otherwise.
  pub fn get_api_token() -> Option<String> {
    std::env::var("FEEDCACHE_API_TOKEN").ok().filter(|t| !t.is_empty())
  }
}
