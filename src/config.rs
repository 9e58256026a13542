use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::store::WriteSync;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub service: ServiceConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub session: SessionConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Base URL of the data service, e.g. https://project.supabase.co
  pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
  /// How cached rows catch up after a write: merge or resync
  #[serde(default)]
  pub after_write: WriteSync,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  /// Keep the signed-in user across restarts
  #[serde(default = "default_true")]
  pub persist: bool,
  /// Session database location (defaults to the platform data directory)
  pub path: Option<PathBuf>,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      persist: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is unset
  #[serde(default = "default_level")]
  pub level: String,
  /// Write daily log files here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_level(),
      directory: None,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./classbook.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/classbook/config.yaml
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
        "No configuration file found. Create one at ~/.config/classbook/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("classbook.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("classbook").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    if config.service.url.trim().is_empty() {
      return Err(eyre!("service.url must not be empty"));
    }
    Ok(config)
  }

  /// Get the service API key from environment variables.
  ///
  /// Checks CLASSBOOK_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("CLASSBOOK_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!(
          "Service API key not found. Set CLASSBOOK_API_KEY or SUPABASE_ANON_KEY environment variable."
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("service:\n  url: https://demo.supabase.co\n").unwrap();
    assert_eq!(config.service.url, "https://demo.supabase.co");
    assert_eq!(config.sync.after_write, WriteSync::Merge);
    assert!(config.session.persist);
    assert_eq!(config.session.path, None);
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
service:
  url: https://demo.supabase.co
sync:
  after_write: resync
session:
  persist: false
  path: /tmp/classbook.db
log:
  level: debug
  directory: /var/log/classbook
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.sync.after_write, WriteSync::Resync);
    assert!(!config.session.persist);
    assert_eq!(config.session.path, Some(PathBuf::from("/tmp/classbook.db")));
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.directory, Some(PathBuf::from("/var/log/classbook")));
  }

  #[test]
  fn test_rejects_unknown_sync_mode_and_blank_url() {
    assert!(Config::parse("service:\n  url: x\nsync:\n  after_write: later\n").is_err());
    assert!(Config::parse("service:\n  url: ''\n").is_err());
  }

  #[test]
  fn test_load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("classbook.yaml");
    std::fs::write(&path, "service:\n  url: https://demo.supabase.co\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.service.url, "https://demo.supabase.co");

    assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());
  }
}
