//! TOML settings for logging, discovery limits and saved device criteria

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tether_core::DeviceIdentification;
use tether_net::{ScannerConfig, MAX_CONCURRENT_PROBES, PROBE_TIMEOUT_MS};
use thiserror::Error;
use tracing::info;

use crate::logging::{LogFormat, LogLevel};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Top-level settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Saved search criteria
    #[serde(default, rename = "device", skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceIdentification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Enumerate USB devices
    #[serde(default = "default_true")]
    pub usb: bool,
    /// Probe Ethernet hosts
    #[serde(default = "default_true")]
    pub ethernet: bool,
    /// Connect timeout for each probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u32,
    /// Probes in flight at once, at most 256
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            usb: true,
            ethernet: true,
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

impl DiscoverySettings {
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            probe_timeout_ms: self.probe_timeout_ms,
            max_concurrent_probes: self.max_concurrent_probes,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout_ms() -> u32 {
    PROBE_TIMEOUT_MS
}

fn default_max_concurrent_probes() -> usize {
    MAX_CONCURRENT_PROBES
}

impl Settings {
    /// Load and validate settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            devices = settings.devices.len(),
            "Loaded settings"
        );
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let discovery = &self.discovery;
        if discovery.probe_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "discovery.probe_timeout_ms must be positive".to_string(),
            ));
        }
        if discovery.max_concurrent_probes == 0 || discovery.max_concurrent_probes > MAX_CONCURRENT_PROBES {
            return Err(SettingsError::Invalid(format!(
                "discovery.max_concurrent_probes must be between 1 and {}",
                MAX_CONCURRENT_PROBES
            )));
        }
        Ok(())
    }
}
