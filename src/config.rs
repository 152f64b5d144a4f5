//! Persistent application configuration model and bootstrap.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::{Error, Result};

/// Root configuration persisted to `cirrus.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Catalog API access.
    pub catalog: CatalogConfig,
    #[serde(default)]
    /// Playback engine launch and control settings.
    pub engine: EngineConfig,
    #[serde(default)]
    /// Optional override for the history file location.
    pub history_file: Option<PathBuf>,
}

/// Catalog API endpoint and credentials.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
}

/// Engine binary location and HTTP control settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_binary")]
    pub binary: String,
    #[serde(default = "default_engine_password")]
    pub password: String,
    #[serde(default = "default_engine_port")]
    pub port: u16,
}

fn default_catalog_base_url() -> String {
    "https://api.soundcloud.com".to_string()
}

fn default_engine_binary() -> String {
    if cfg!(target_os = "macos") {
        "/Applications/VLC.app/Contents/MacOS/VLC".to_string()
    } else {
        "vlc".to_string()
    }
}

fn default_engine_password() -> String {
    "cirrus".to_string()
}

fn default_engine_port() -> u16 {
    8080
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            client_id: String::new(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            password: default_engine_password(),
            port: default_engine_port(),
        }
    }
}

/// Directory holding the config and history files.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cirrus")
}

/// Default config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("cirrus.toml")
}

impl Config {
    /// Loads the config file, writing a default one first if it is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default_config = Self::default();
            info!(
                "Config file not found. Creating default config. path={}",
                path.display()
            );
            default_config.save(path)?;
            return Ok(default_config);
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|err| Error::Parse(format!("config file {}: {err}", path.display())))
    }

    /// Writes the config as TOML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = toml::to_string_pretty(self).expect("config always serializes to TOML");
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Resolved history file path: explicit override or the config directory.
    pub fn history_file(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| config_dir().join("history.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn test_missing_file_bootstraps_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cirrus.toml");
        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert!(config.catalog.client_id.is_empty());
        assert_eq!(config.engine.port, 8080);
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cirrus.toml");
        let mut config = Config::default();
        config.catalog.client_id = "abc123".to_string();
        config.engine.port = 9090;
        config.save(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cirrus.toml");
        std::fs::write(&path, "[catalog]\nclient_id = \"xyz\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.catalog.client_id, "xyz");
        assert_eq!(config.engine.password, "cirrus");
    }
}
