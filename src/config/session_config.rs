use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    DEFAULT_CELEBRATION_HOLD_SECS, DEFAULT_NAME_MARKERS, DEFAULT_SCAN_TIMEOUT_SECS,
    UUID_SMART_HOLE_SERVICE,
};
use crate::core::bluetooth::{ScanFilter, WireProtocol};

/// How `celebrate()` is rendered on the strip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CelebrationStyle {
    /// Green flash, back to solid after `celebration_hold_secs`
    #[default]
    Sequence,
    /// Single `CELEBRATION` frame, animation handled by the firmware
    Firmware,
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Scan window before giving up, in seconds
    pub scan_timeout_secs: u64,
    /// How long the celebration flash lasts, in seconds
    pub celebration_hold_secs: u64,
    /// Accept devices whose name contains any of these
    pub name_markers: Vec<String>,
    /// Ask the platform to report only devices advertising the Smart Hole service.
    /// Disable for firmware that only advertises its name.
    pub filter_by_service: bool,
    /// Ignore advertisements weaker than this (dBm)
    pub min_rssi: Option<i16>,
    /// Command vocabulary of the firmware
    pub protocol: WireProtocol,
    pub celebration: CelebrationStyle,
    /// Connect to the first matching device instead of waiting for `connect()`
    pub auto_connect: bool,
    /// Run the celebration on every detected shot
    pub celebrate_on_shot: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            celebration_hold_secs: DEFAULT_CELEBRATION_HOLD_SECS,
            name_markers: DEFAULT_NAME_MARKERS.iter().map(|m| m.to_string()).collect(),
            filter_by_service: false,
            min_rssi: None,
            protocol: WireProtocol::Canonical,
            celebration: CelebrationStyle::Sequence,
            auto_connect: true,
            celebrate_on_shot: false,
        }
    }
}

impl SessionConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn celebration_hold(&self) -> Duration {
        Duration::from_secs(self.celebration_hold_secs)
    }

    /// The match rule used while scanning
    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            service: UUID_SMART_HOLE_SERVICE,
            filter_by_service: self.filter_by_service,
            name_markers: self.name_markers.clone(),
            min_rssi: self.min_rssi,
        }
    }
}
