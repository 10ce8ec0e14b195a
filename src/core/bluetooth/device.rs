//! Bluetooth device representation and related functionality

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform-specific unique identifier for a peripheral
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Represents a discovered Bluetooth device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Platform-specific unique identifier for the device (especially important on macOS)
    pub id: DeviceId,
    /// The name of the device, if available
    pub name: Option<String>,
    /// The address of the device (MAC address on most platforms, may be unavailable on macOS)
    pub address: Option<String>,
    /// The signal strength (RSSI) of the advertisement
    pub rssi: Option<i16>,
    /// GATT service UUIDs listed in the advertisement
    pub services: Vec<Uuid>,
}

impl DeviceInfo {
    /// Creates a new DeviceInfo instance
    pub fn new(id: DeviceId, name: Option<String>, rssi: Option<i16>) -> Self {
        Self {
            id,
            name,
            address: None,
            rssi,
            services: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_services(mut self, services: Vec<Uuid>) -> Self {
        self.services = services;
        self
    }

    /// Name for log lines
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    /// Returns true if the advertisement lists the given service
    pub fn advertises(&self, service: Uuid) -> bool {
        self.services.contains(&service)
    }

    /// Returns true if the device name contains any of the markers
    pub fn name_contains_any<S: AsRef<str>>(&self, markers: &[S]) -> bool {
        self.name
            .as_ref()
            .map(|name| markers.iter().any(|marker| name.contains(marker.as_ref())))
            .unwrap_or(false)
    }
}

/// Describes which advertisements count as a Smart Hole
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFilter {
    /// The target service. A device advertising it always matches.
    pub service: Uuid,
    /// Whether the radio should only report devices advertising `service`
    pub filter_by_service: bool,
    /// Name fragments accepted when the service is not advertised
    pub name_markers: Vec<String>,
    /// Devices weaker than this are ignored
    pub min_rssi: Option<i16>,
}

impl ScanFilter {
    /// Services to hand to the platform scanner. Empty means "report everything".
    pub fn platform_services(&self) -> Vec<Uuid> {
        if self.filter_by_service {
            vec![self.service]
        } else {
            Vec::new()
        }
    }

    /// The match rule: target service or name marker, with enough signal.
    pub fn matches(&self, device: &DeviceInfo) -> bool {
        if let (Some(min), Some(rssi)) = (self.min_rssi, device.rssi) {
            if rssi < min {
                return false;
            }
        }
        device.advertises(self.service) || device.name_contains_any(&self.name_markers)
    }
}
