//! Configuration system for Nearby.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $NEARBY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/nearby/config.toml
//!   3. ~/.config/nearby/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::permission::Permission;
use crate::wire::DEFAULT_SERVICE_NAME;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NearbyConfig {
    pub discovery: DiscoveryConfig,
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub permissions: PermissionsConfig,
    pub simulation: SimulationConfig,
}

/// Which side of discovery the daemon starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Advertise this device's info.
    Publish,
    /// Search for peers advertising the service.
    Subscribe,
}

impl std::str::FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(DiscoveryMode::Publish),
            "subscribe" | "search" => Ok(DiscoveryMode::Subscribe),
            other => Err(format!("unknown discovery mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Service name shared by publishers and subscribers.
    pub service_name: String,
    /// Session opened on startup when `auto_start` is set.
    pub mode: DiscoveryMode,
    /// Start discovery immediately instead of waiting for an API call.
    pub auto_start: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Advertised model. Empty = read from the host.
    pub model: String,
    /// Advertised OS version. Empty = read from the host.
    pub os_version: String,
    /// Advertised battery percent. Unset = read from the host.
    pub battery_percent: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Loopback port for the HTTP control API.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Permissions the static gate reports as granted.
    pub granted: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Neighbours placed on the loopback medium at startup. Each one publishes
    /// the configured service with its own advertisement.
    pub neighbours: Vec<NeighbourConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighbourConfig {
    pub model: String,
    pub os_version: String,
    pub battery_percent: u8,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            mode: DiscoveryMode::Subscribe,
            auto_start: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { api_port: 9101 }
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            granted: Permission::REQUIRED.to_vec(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            neighbours: vec![
                NeighbourConfig {
                    model: "Pixel 7".into(),
                    os_version: "14".into(),
                    battery_percent: 87,
                },
                NeighbourConfig {
                    model: "SM-S911B".into(),
                    os_version: "13".into(),
                    battery_percent: 42,
                },
            ],
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("nearby")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl NearbyConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, then apply env overrides.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            NearbyConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("NEARBY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&NearbyConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply NEARBY_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NEARBY_DISCOVERY__SERVICE_NAME") {
            self.discovery.service_name = v;
        }
        if let Ok(v) = std::env::var("NEARBY_DISCOVERY__MODE") {
            if let Ok(mode) = v.parse() {
                self.discovery.mode = mode;
            }
        }
        if let Ok(v) = std::env::var("NEARBY_DISCOVERY__AUTO_START") {
            self.discovery.auto_start = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("NEARBY_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Ok(v) = std::env::var("NEARBY_DEVICE__MODEL") {
            self.device.model = v;
        }
    }
}
