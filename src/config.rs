use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Property selected when nothing has been persisted yet
  pub default_property: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Backend base URL, e.g. https://pmcs.example.com
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Minutes before cached collections are refetched
  #[serde(default = "default_stale_minutes")]
  pub stale_minutes: i64,
  /// Override for the cache database location
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_minutes: default_stale_minutes(),
      path: None,
    }
  }
}

fn default_stale_minutes() -> i64 {
  5
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
  /// Page size requested from the jobs endpoints
  pub limit: Option<u32>,
  /// Ask the backend whether a property runs preventive maintenance before loading PM jobs
  #[serde(default = "default_true")]
  pub check_pm_eligibility: bool,
}

impl Default for JobsConfig {
  fn default() -> Self {
    Self {
      limit: None,
      check_pm_eligibility: true,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./lubd.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lubd/config.yaml
  /// 4. ~/.config/lubd/config.yaml
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
        "No configuration file found. Create one at ~/.config/lubd/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("lubd.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lubd").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.cache.stale_minutes < 0 {
      return Err(eyre!("cache.stale_minutes must not be negative"));
    }
    Ok(config)
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks LUBD_API_TOKEN first, then LUBD_ACCESS_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("LUBD_API_TOKEN")
      .or_else(|_| std::env::var("LUBD_ACCESS_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set LUBD_API_TOKEN or LUBD_ACCESS_TOKEN environment variable.")
      })
  }
}
