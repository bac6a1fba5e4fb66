use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_TTL_MILLIS;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the portfolio API, e.g. "https://api.example.com"
  pub url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// SQLite file (defaults to $XDG_DATA_HOME/folio/cache.db)
  pub path: Option<PathBuf>,
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
  /// Reject cache writes past this many bytes
  pub max_bytes: Option<usize>,
}

fn default_ttl_secs() -> u64 {
  (DEFAULT_TTL_MILLIS / 1000) as u64
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      ttl_secs: default_ttl_secs(),
      max_bytes: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter directive used when FOLIO_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Also write logs to a daily rolling file at this path
  pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
  "warn".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./folio.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/folio/config.yaml
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
        "No configuration file found. Create one at ~/.config/folio/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("folio.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("folio").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;

    url::Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid api.url {:?}: {}", config.api.url, e))?;

    Ok(config)
  }

  /// Get the admin password from the environment.
  ///
  /// Checks FOLIO_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("FOLIO_PASSWORD").map_err(|_| {
      eyre!("Password not found. Set FOLIO_PASSWORD or pass --password-stdin.")
    })
  }
}
