//! Session state machine
//!
//! The transition table is the single authority on which state follows which.
//! It is pure: the session applies the side effects (timers, handle cleanup,
//! sink notifications) after the table has accepted a trigger.
//!
//! ```text
//! Disconnected --StartScan--------------> Scanning
//! Scanning     --DeviceMatched----------> Connecting
//! Scanning     --ScanTimeout/ScanStopped> Disconnected
//! Connecting   --LinkEstablished--------> Connected
//! Connecting   --LinkFailed-------------> Disconnected
//! Connected    --ServicesResolved-------> Ready
//! Connected    --ServiceDiscoveryFailed-> Disconnected
//! Connecting/Connected/Ready --PeerDisconnected--> Disconnected
//! (any) --DisconnectRequested / AdapterUnavailable--> Disconnected
//! ```

use std::fmt;

use serde::Serialize;

use crate::core::bluetooth::constants::DEVICE_PRODUCT_NAME;
use crate::core::bluetooth::types::DisconnectReason;

/// Connection state of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    /// Connected with both characteristics bound; commands may be sent
    Ready,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ready => "ready",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns the state that follows `trigger`, or `None` if the trigger is
    /// not accepted in this state.
    pub fn next(&self, trigger: &Trigger) -> Option<SessionState> {
        use SessionState::*;

        match (self, trigger) {
            (Disconnected, Trigger::StartScan) => Some(Scanning),
            (Scanning, Trigger::DeviceMatched) => Some(Connecting),
            (Scanning, Trigger::ScanTimeout | Trigger::ScanStopped) => Some(Disconnected),
            (Connecting, Trigger::LinkEstablished) => Some(Connected),
            (Connecting, Trigger::LinkFailed(_)) => Some(Disconnected),
            (Connected, Trigger::ServicesResolved) => Some(Ready),
            (Connected, Trigger::ServiceDiscoveryFailed(_)) => Some(Disconnected),
            (Connecting | Connected | Ready, Trigger::PeerDisconnected(_)) => Some(Disconnected),
            (Disconnected, Trigger::DisconnectRequested | Trigger::AdapterUnavailable) => None,
            (_, Trigger::DisconnectRequested | Trigger::AdapterUnavailable) => Some(Disconnected),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    StartScan,
    DeviceMatched,
    ScanTimeout,
    ScanStopped,
    LinkEstablished,
    LinkFailed(String),
    ServicesResolved,
    ServiceDiscoveryFailed(String),
    PeerDisconnected(Option<String>),
    DisconnectRequested,
    AdapterUnavailable,
}

impl Trigger {
    /// Reason attached to a transition into `Disconnected`
    pub fn reason(&self, from: SessionState) -> Option<DisconnectReason> {
        match self {
            Self::ScanTimeout => Some(DisconnectReason::ScanTimeout),
            Self::ScanStopped => Some(DisconnectReason::ScanStopped),
            Self::LinkFailed(reason) => Some(DisconnectReason::ConnectionFailed(reason.clone())),
            Self::ServiceDiscoveryFailed(reason) => {
                Some(DisconnectReason::ServiceDiscoveryFailed(reason.clone()))
            }
            // a link that drops before it was ever established is a failed connection
            Self::PeerDisconnected(reason) if from == SessionState::Connecting => Some(
                DisconnectReason::ConnectionFailed(
                    reason.clone().unwrap_or_else(|| "link lost".to_string()),
                ),
            ),
            Self::PeerDisconnected(reason) => {
                Some(DisconnectReason::PeerDisconnected(reason.clone()))
            }
            Self::DisconnectRequested => Some(DisconnectReason::Requested),
            Self::AdapterUnavailable => Some(DisconnectReason::AdapterUnavailable),
            Self::StartScan
            | Self::DeviceMatched
            | Self::LinkEstablished
            | Self::ServicesResolved => None,
        }
    }
}

/// Human readable status line for the current state and the last reason.
pub fn status_text(state: SessionState, last_reason: Option<&DisconnectReason>) -> String {
    match state {
        SessionState::Scanning => format!("Scanning for {DEVICE_PRODUCT_NAME}..."),
        SessionState::Connecting => format!("{DEVICE_PRODUCT_NAME} found, connecting..."),
        SessionState::Connected => "Connected, discovering services...".to_string(),
        SessionState::Ready => "Ready".to_string(),
        SessionState::Disconnected => match last_reason {
            Some(DisconnectReason::AdapterUnavailable) => "Bluetooth not available".to_string(),
            Some(DisconnectReason::ScanTimeout) => format!("{DEVICE_PRODUCT_NAME} not found"),
            Some(DisconnectReason::ScanStopped) => "Scan stopped".to_string(),
            Some(DisconnectReason::ConnectionFailed(reason)) => {
                format!("Connection failed: {reason}")
            }
            Some(DisconnectReason::ServiceDiscoveryFailed(reason)) => {
                format!("Service discovery failed: {reason}")
            }
            Some(DisconnectReason::PeerDisconnected(None)) => {
                format!("{DEVICE_PRODUCT_NAME} disconnected")
            }
            Some(DisconnectReason::PeerDisconnected(Some(reason))) => {
                format!("{DEVICE_PRODUCT_NAME} disconnected: {reason}")
            }
            Some(DisconnectReason::Requested) | None => "Disconnected".to_string(),
        },
    }
}
