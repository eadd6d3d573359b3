//! Device info — what this device advertises about itself.

use std::path::Path;

use bytes::Bytes;

use crate::config::DeviceConfig;
use crate::wire;

/// Supplies the three values carried in an outbound advertisement.
pub trait DeviceInfoProvider: Send + Sync {
    fn model(&self) -> String;
    fn os_version(&self) -> String;
    fn battery_percent(&self) -> u8;
}

/// Build the advertisement payload for a provider.
pub fn advertisement(provider: &dyn DeviceInfoProvider) -> Bytes {
    wire::encode(
        &provider.model(),
        &provider.os_version(),
        provider.battery_percent(),
    )
}

/// Fixed values — simulated neighbours and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDeviceInfo {
    pub model: String,
    pub os_version: String,
    pub battery_percent: u8,
}

impl StaticDeviceInfo {
    pub fn new(model: impl Into<String>, os_version: impl Into<String>, battery_percent: u8) -> Self {
        Self {
            model: model.into(),
            os_version: os_version.into(),
            battery_percent,
        }
    }
}

impl DeviceInfoProvider for StaticDeviceInfo {
    fn model(&self) -> String {
        self.model.clone()
    }

    fn os_version(&self) -> String {
        self.os_version.clone()
    }

    fn battery_percent(&self) -> u8 {
        self.battery_percent
    }
}

// ── Host ──────────────────────────────────────────────────────────────────────

const DMI_PRODUCT_NAME: &str = "/sys/devices/virtual/dmi/id/product_name";
const KERNEL_OSRELEASE: &str = "/proc/sys/kernel/osrelease";
const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Reads the host's identity from sysfs/procfs, with config overrides.
///
/// Anything unreadable falls back to a neutral value: "unknown" for strings,
/// 100 for the battery (mains-powered hosts have no battery node).
#[derive(Debug, Clone, Default)]
pub struct HostDeviceInfo {
    overrides: DeviceConfig,
}

impl HostDeviceInfo {
    pub fn new(overrides: DeviceConfig) -> Self {
        Self { overrides }
    }
}

impl DeviceInfoProvider for HostDeviceInfo {
    fn model(&self) -> String {
        if !self.overrides.model.is_empty() {
            return self.overrides.model.clone();
        }
        read_trimmed(Path::new(DMI_PRODUCT_NAME)).unwrap_or_else(|| "unknown".to_string())
    }

    fn os_version(&self) -> String {
        if !self.overrides.os_version.is_empty() {
            return self.overrides.os_version.clone();
        }
        read_trimmed(Path::new(KERNEL_OSRELEASE)).unwrap_or_else(|| "unknown".to_string())
    }

    fn battery_percent(&self) -> u8 {
        if let Some(p) = self.overrides.battery_percent {
            return p;
        }
        battery_capacity(Path::new(POWER_SUPPLY_DIR)).unwrap_or(100)
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First `*/capacity` under the power supply directory, clamped to 0..=100.
fn battery_capacity(dir: &Path) -> Option<u8> {
    let mut entries: Vec<_> = std::fs::read_dir(dir).ok()?.flatten().collect();
    entries.sort_by_key(|e| e.file_name());
    entries.iter().find_map(|entry| {
        read_trimmed(&entry.path().join("capacity"))?
            .parse::<u32>()
            .ok()
            .map(|p| p.min(100) as u8)
    })
}
