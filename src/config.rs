use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the worker serves; only same-origin requests are intercepted
  pub origin: Url,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Build-time static assets, relative to `origin` or absolute
  #[serde(default)]
  pub manifest: Vec<String>,
  /// JSON array of asset URLs written by the build, appended to `manifest`
  pub manifest_file: Option<PathBuf>,
  #[serde(default)]
  pub routes: RoutesConfig,
  #[serde(default)]
  pub push: PushConfig,
  /// SQLite database path (defaults to the platform data directory)
  pub database: Option<PathBuf>,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_prefix")]
  pub prefix: String,
  /// Deploy version; bumping it replaces both generations
  #[serde(default = "default_version")]
  pub version: String,
  /// Path prefixes always treated as static assets
  #[serde(default = "default_static_prefixes")]
  pub static_prefixes: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: default_prefix(),
      version: default_version(),
      static_prefixes: default_static_prefixes(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutesConfig {
  /// Substring identifying API paths
  #[serde(default = "default_api_marker")]
  pub api_marker: String,
  /// Regular expressions for API paths served network-first
  #[serde(default = "default_cacheable")]
  pub cacheable: Vec<String>,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      api_marker: default_api_marker(),
      cacheable: default_cacheable(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
  #[serde(default = "default_app_name")]
  pub app_name: String,
  #[serde(default = "default_push_body")]
  pub default_body: String,
  #[serde(default = "default_push_url")]
  pub default_url: String,
  #[serde(default = "default_icon")]
  pub icon: String,
  #[serde(default = "default_icon")]
  pub badge: String,
}

impl Default for PushConfig {
  fn default() -> Self {
    Self {
      app_name: default_app_name(),
      default_body: default_push_body(),
      default_url: default_push_url(),
      icon: default_icon(),
      badge: default_icon(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Filter used when RUST_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Log directory (defaults to the platform data directory)
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

fn default_prefix() -> String {
  "tikpluse".to_string()
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_static_prefixes() -> Vec<String> {
  vec!["/static/".to_string()]
}

fn default_api_marker() -> String {
  "/api/".to_string()
}

fn default_cacheable() -> Vec<String> {
  vec![
    r"^/api/v1/analytics".to_string(),
    r"^/api/v1/dashboard".to_string(),
    r"^/api/v1/users/me$".to_string(),
  ]
}

fn default_app_name() -> String {
  "TikPluse".to_string()
}

fn default_push_body() -> String {
  "You have a new notification".to_string()
}

fn default_push_url() -> String {
  "/".to_string()
}

fn default_icon() -> String {
  "/logo192.png".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tikpluse.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tikpluse/config.yaml
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
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/tikpluse/config.yaml"
        ))
      }
    };

    if let Some(origin) = Self::origin_override()? {
      config.origin = origin;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tikpluse.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tikpluse").join("config.yaml");
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

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Origin override from TIKPLUSE_ORIGIN.
  fn origin_override() -> Result<Option<Url>> {
    match std::env::var("TIKPLUSE_ORIGIN") {
      Ok(value) => Url::parse(&value)
        .map(Some)
        .map_err(|e| eyre!("Invalid TIKPLUSE_ORIGIN '{}': {}", value, e)),
      Err(_) => Ok(None),
    }
  }

  /// The install manifest resolved against the origin, in order, without duplicates.
  pub fn manifest_urls(&self) -> Result<Vec<Url>> {
    let mut entries = self.manifest.clone();

    if let Some(path) = &self.manifest_file {
      let contents = std::fs::read_to_string(path)
        .map_err(|e| eyre!("Failed to read manifest file {}: {}", path.display(), e))?;
      let listed: Vec<String> = serde_json::from_str(&contents)
        .map_err(|e| eyre!("Failed to parse manifest file {}: {}", path.display(), e))?;
      entries.extend(listed);
    }

    let mut urls: Vec<Url> = Vec::with_capacity(entries.len());
    for entry in &entries {
      let url = self
        .origin
        .join(entry)
        .map_err(|e| eyre!("Invalid manifest entry '{}': {}", entry, e))?;
      if !urls.contains(&url) {
        urls.push(url);
      }
    }

    Ok(urls)
  }
}
