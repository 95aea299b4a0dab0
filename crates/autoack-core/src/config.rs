//! Persisted watcher settings.
//!
//! The record is written on every settings change by the embedding surface
//! and read once at startup. Unknown or missing fields fall back to their
//! defaults so older files keep loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Minimum gap between two fired clicks, and the post-click pacing.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    /// Match acceptance threshold, operator range `[0.5, 1.0]`.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub test_mode: bool,
    /// Whether the surface should start watching right after startup.
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_toggle_key")]
    pub toggle_key: String,
    /// Template files in cycle order.
    #[serde(default)]
    pub template_paths: Vec<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            threshold: default_threshold(),
            test_mode: false,
            auto_start: false,
            toggle_key: default_toggle_key(),
            template_paths: Vec::new(),
        }
    }
}

fn default_interval_secs() -> f64 {
    2.0
}

fn default_threshold() -> f64 {
    0.8
}

fn default_toggle_key() -> String {
    "F2".to_string()
}

/// App data directory for autoack.
pub fn config_dir() -> PathBuf {
    let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("autoack")
}

/// Default location of the settings record.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load the settings record from its default location; a missing file is
/// simply the default configuration.
pub fn load_config() -> Result<WatchConfig, ConfigError> {
    let path = config_path();
    if !path.exists() {
        info!(?path, "no configuration file, using defaults");
        return Ok(WatchConfig::default());
    }
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<WatchConfig, ConfigError> {
    let json = fs::read_to_string(path)?;
    let config: WatchConfig = serde_json::from_str(&json)?;
    debug!(?path, "loaded configuration");
    Ok(config)
}

/// Write the settings record to its default location.
pub fn save_config(config: &WatchConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, config)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, config: &WatchConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    info!(?path, "saved configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = WatchConfig {
            interval_secs: 1.5,
            threshold: 0.85,
            test_mode: true,
            auto_start: true,
            toggle_key: "F4".into(),
            template_paths: vec![PathBuf::from("templates/accept.png")],
        };

        save_config_to(&path, &config).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.interval_secs, 1.5);
        assert_eq!(loaded.threshold, 0.85);
        assert!(loaded.test_mode);
        assert!(loaded.auto_start);
        assert_eq!(loaded.toggle_key, "F4");
        assert_eq!(loaded.template_paths, config.template_paths);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: WatchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.interval_secs, 2.0);
        assert_eq!(config.threshold, 0.8);
        assert_eq!(config.toggle_key, "F2");
        assert!(!config.test_mode);
        assert!(!config.auto_start);
        assert!(config.template_paths.is_empty());
    }

    #[test]
    fn garbage_files_are_reported_as_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json at all").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::Json(_))
        ));
    }
}
