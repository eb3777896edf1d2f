//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, EnsembleConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/ensemble/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("ensemble/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("ensemble.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<EnsembleConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string.
fn parse_toml(contents: &str, path: &Path) -> Result<EnsembleConfig, ConfigError> {
    let table: toml::Table = contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut config = EnsembleConfig::default();

    if let Some(service) = table.get("service").and_then(|v| v.as_table()) {
        if let Some(v) = service.get("api_base_url").and_then(|v| v.as_str()) {
            config.service.api_base_url = v.to_string();
        }
        if let Some(v) = service.get("channel_url").and_then(|v| v.as_str()) {
            config.service.channel_url = v.to_string();
        }
        if let Some(v) = service.get("upload_base_url").and_then(|v| v.as_str()) {
            config.service.upload_base_url = v.to_string();
        }
    }

    if let Some(device) = table.get("device").and_then(|v| v.as_table()) {
        if let Some(v) = device.get("name").and_then(|v| v.as_str()) {
            config.device.name = v.to_string();
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(config)
}

/// Merge two configs, with `overlay` values winning where they differ from
/// compiled defaults.
pub fn merge_configs(base: EnsembleConfig, overlay: EnsembleConfig) -> EnsembleConfig {
    let defaults = EnsembleConfig::default();
    let mut merged = base;

    if overlay.service.api_base_url != defaults.service.api_base_url {
        merged.service.api_base_url = overlay.service.api_base_url;
    }
    if overlay.service.channel_url != defaults.service.channel_url {
        merged.service.channel_url = overlay.service.channel_url;
    }
    if overlay.service.upload_base_url != defaults.service.upload_base_url {
        merged.service.upload_base_url = overlay.service.upload_base_url;
    }
    if overlay.device.name != defaults.device.name {
        merged.device.name = overlay.device.name;
    }
    if overlay.telemetry.log_level != defaults.telemetry.log_level {
        merged.telemetry.log_level = overlay.telemetry.log_level;
    }

    merged
}

/// Apply `ENSEMBLE_*` environment variable overrides.
pub fn apply_env_overrides(config: &mut EnsembleConfig, sources: &mut ConfigSources) {
    let overrides: [(&str, &mut String); 5] = [
        ("ENSEMBLE_API_BASE_URL", &mut config.service.api_base_url),
        ("ENSEMBLE_CHANNEL_URL", &mut config.service.channel_url),
        (
            "ENSEMBLE_UPLOAD_BASE_URL",
            &mut config.service.upload_base_url,
        ),
        ("ENSEMBLE_DEVICE_NAME", &mut config.device.name),
        ("ENSEMBLE_LOG_LEVEL", &mut config.telemetry.log_level),
    ];

    for (var, slot) in overrides {
        if let Ok(value) = env::var(var) {
            *slot = value;
            sources.env_overrides.push(var.to_string());
        }
    }
}
