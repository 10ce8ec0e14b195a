//! Defines shared data structures for the Bluetooth module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::bluetooth::device::DeviceInfo;
use crate::core::bluetooth::state::SessionState;

/// A shot reported by the Smart Hole's sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShotEvent {
    /// 1-based count of shots since the session became ready
    pub shot_number: u64,
    /// When the notification was received
    pub detected_at: DateTime<Utc>,
    /// The raw notification text
    pub payload: String,
    /// Signal strength of the peripheral at the time, if known
    pub rssi: Option<i16>,
}

/// Last known state of the LED strip, as commanded by this session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedStatus {
    /// Off until this session sends `LED_ON`
    pub is_on: bool,
    pub color: Option<String>,
    pub pattern: Option<String>,
}

/// Why the session returned to `Disconnected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum DisconnectReason {
    #[error("adapter unavailable")]
    AdapterUnavailable,
    #[error("scan timeout")]
    ScanTimeout,
    #[error("scan stopped")]
    ScanStopped,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("service discovery failed: {0}")]
    ServiceDiscoveryFailed(String),
    #[error("peer disconnected{}", with_detail(.0))]
    PeerDisconnected(Option<String>),
    #[error("disconnect requested")]
    Requested,
}

fn with_detail(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// The two characteristic handles a ready session is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Characteristics {
    pub led_control: Option<Uuid>,
    pub shot_sensor: Option<Uuid>,
}

impl Characteristics {
    pub fn is_bound(&self) -> bool {
        self.led_control.is_some() && self.shot_sensor.is_some()
    }
}

/// Point-in-time view of a session for UI collaborators
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub status: String,
    pub last_reason: Option<DisconnectReason>,
    pub device: Option<DeviceInfo>,
    pub rssi: Option<i16>,
    pub led: LedStatus,
    pub shot_count: u64,
}
