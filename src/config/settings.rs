//! Application settings

use crate::core::broadcaster::BroadcasterConfig;
use crate::core::logger::LogFormat;
use crate::core::transport::{SerialConfig, SocketConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Platform config directory could not be determined
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("Config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for [`AppConfig`]
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Packet parameters and rate gate
    pub broadcaster: BroadcasterConfig,
    /// Serial transport settings
    pub serial: SerialConfig,
    /// Socket transport settings
    pub socket: SocketConfig,
    /// Payload queue settings
    pub queue: QueueConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the default location, defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        super::init_directories().map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Payload queue settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded capacity, unbounded when unset
    pub capacity: Option<usize>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Write a daily rolling log file
    pub file: bool,
    /// Directory for the rolling log file
    pub directory: Option<PathBuf>,
    /// Packet traffic log file
    pub packet_log: Option<PathBuf>,
    /// Packet traffic log format
    pub packet_log_format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
            directory: super::log_dir(),
            packet_log: None,
            packet_log_format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.broadcaster.device_name, "nbpcast");
        assert_eq!(config.broadcaster.protocol_version, "NBP1");
        assert!((config.broadcaster.min_update_interval - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.socket.port, 35000);
        assert_eq!(config.serial.device, "/dev/rfcomm0");
        assert_eq!(config.queue.capacity, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[broadcaster]\ndevice_name = \"Track\"\n\n[socket]\nport = 4000\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.broadcaster.device_name, "Track");
        assert_eq!(config.broadcaster.protocol_version, "NBP1");
        assert_eq!(config.socket.port, 4000);
        assert_eq!(config.socket.ip, "127.0.0.1");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.queue.capacity = Some(64);
        config.logging.packet_log = Some(dir.path().join("packets.log"));
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[socket]\nport = \"not a port\"\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(AppConfig::load_from(&missing), Err(ConfigError::Io { .. })));
    }
}
