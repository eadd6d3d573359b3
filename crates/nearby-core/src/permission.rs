//! Permission gate — the fixed set of named permissions discovery needs.
//!
//! The coordinator never prompts; whatever front end drives it asks the gate
//! first and refuses to attach while anything in [`Permission::REQUIRED`] is
//! still missing.

use std::collections::HashSet;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    FineLocation,
    NearbyWifiDevices,
    AccessWifiState,
    ChangeWifiState,
    ChangeNetworkState,
    Internet,
}

impl Permission {
    /// Everything attach/publish/subscribe/connect depends on.
    pub const REQUIRED: [Permission; 6] = [
        Permission::FineLocation,
        Permission::NearbyWifiDevices,
        Permission::AccessWifiState,
        Permission::ChangeWifiState,
        Permission::ChangeNetworkState,
        Permission::Internet,
    ];
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Permission::FineLocation => "fine_location",
            Permission::NearbyWifiDevices => "nearby_wifi_devices",
            Permission::AccessWifiState => "access_wifi_state",
            Permission::ChangeWifiState => "change_wifi_state",
            Permission::ChangeNetworkState => "change_network_state",
            Permission::Internet => "internet",
        };
        f.write_str(name)
    }
}

/// Queries and requests permissions on behalf of the discovery front end.
pub trait PermissionGate: Send + Sync {
    /// Is this permission currently granted?
    fn is_granted(&self, permission: Permission) -> bool;

    /// Ask for the given permissions. Returns the ones still denied afterwards.
    fn request(&self, permissions: &[Permission]) -> Vec<Permission>;
}

/// Required permissions the gate does not currently grant.
pub fn missing(gate: &dyn PermissionGate) -> Vec<Permission> {
    Permission::REQUIRED
        .into_iter()
        .filter(|p| !gate.is_granted(*p))
        .collect()
}

/// Check the required set and request whatever is missing.
/// Returns the permissions that remain denied.
pub fn ensure_required(gate: &dyn PermissionGate) -> Vec<Permission> {
    let to_request = missing(gate);
    if to_request.is_empty() {
        return to_request;
    }
    gate.request(&to_request)
}

/// A gate with a fixed grant set, typically loaded from config.
///
/// Requests never prompt anyone: they succeed only for permissions already in
/// the set, which is what a headless host can honestly report.
pub struct StaticPermissionGate {
    granted: RwLock<HashSet<Permission>>,
}

impl StaticPermissionGate {
    pub fn new(granted: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            granted: RwLock::new(granted.into_iter().collect()),
        }
    }

    /// Grant everything in [`Permission::REQUIRED`].
    pub fn all_granted() -> Self {
        Self::new(Permission::REQUIRED)
    }

    pub fn grant(&self, permission: Permission) {
        self.granted
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(permission);
    }

    pub fn revoke(&self, permission: Permission) {
        self.granted
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&permission);
    }
}

impl PermissionGate for StaticPermissionGate {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&permission)
    }

    fn request(&self, permissions: &[Permission]) -> Vec<Permission> {
        permissions
            .iter()
            .copied()
            .filter(|p| !self.is_granted(*p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_granted_has_nothing_missing() {
        let gate = StaticPermissionGate::all_granted();
        assert!(missing(&gate).is_empty());
        assert!(ensure_required(&gate).is_empty());
    }

    #[test]
    fn revoked_permission_stays_denied_after_request() {
        let gate = StaticPermissionGate::all_granted();
        gate.revoke(Permission::NearbyWifiDevices);

        assert_eq!(missing(&gate), vec![Permission::NearbyWifiDevices]);
        assert_eq!(ensure_required(&gate), vec![Permission::NearbyWifiDevices]);

        gate.grant(Permission::NearbyWifiDevices);
        assert!(ensure_required(&gate).is_empty());
    }

    #[test]
    fn missing_preserves_required_order() {
        let gate = StaticPermissionGate::new([Permission::AccessWifiState]);
        let denied = missing(&gate);
        assert_eq!(denied.len(), 5);
        assert_eq!(denied[0], Permission::FineLocation);
        assert_eq!(denied[4], Permission::Internet);
    }

    #[test]
    fn display_matches_config_names() {
        for p in Permission::REQUIRED {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json.trim_matches('"'), p.to_string());
        }
    }
}
