//! Minimal configuration loading for Ensemble.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/ensemble/config.toml` (system)
//! 2. `~/.config/ensemble/config.toml` (user)
//! 3. `./ensemble.toml` (local override)
//! 4. Environment variables (`ENSEMBLE_*`)
//!
//! # Example Config
//!
//! ```toml
//! [service]
//! api_base_url = "https://ensemble.example/api"
//! channel_url = "https://ensemble.example/api/channel"
//! upload_base_url = "https://uploads.example/videos"
//!
//! [device]
//! name = "Kitchen phone"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;

pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Endpoints of the session-coordination service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the request/response API.
    pub api_base_url: String,
    /// URL of the real-time channel endpoint.
    pub channel_url: String,
    /// Base URL for clip uploads, used when no signed URL is available.
    pub upload_base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8090/api".to_string(),
            channel_url: "http://127.0.0.1:8090/api/channel".to_string(),
            upload_base_url: "http://127.0.0.1:8090/videos".to_string(),
        }
    }
}

/// This device's identity within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name attached to local sources.
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "This device".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Complete Ensemble configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnsembleConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl EnsembleConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/ensemble/config.toml`
    /// 3. `~/.config/ensemble/config.toml`
    /// 4. `./ensemble.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = EnsembleConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_localhost_endpoints() {
        let config = EnsembleConfig::default();
        assert!(config.service.api_base_url.starts_with("http://127.0.0.1"));
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.device.name, "This device");
    }
}
