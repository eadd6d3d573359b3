//! nearby-core — advertisement wire format, configuration, and the
//! device/permission collaborators. All other Nearby crates depend on this one.

pub mod config;
pub mod device;
pub mod permission;
pub mod wire;

pub use device::{DeviceInfoProvider, HostDeviceInfo, StaticDeviceInfo};
pub use permission::{Permission, PermissionGate, StaticPermissionGate};
pub use wire::{DecodeError, ServiceInfo};
