//! Bluetooth functionality for the Smart Hole
//! This module handles the whole BLE session: scanning, connecting, binding
//! the LED and shot sensor characteristics, sending LED commands and turning
//! shot notifications into events.

pub mod commands;
pub mod constants;
mod device;
mod error;
mod manager;
#[cfg(feature = "bluest")]
mod platform;
mod radio;
mod session;
mod sink;
mod state;
mod timer;
mod types;

// Re-export types that should be publicly accessible
pub use commands::{decode, encode, LedColor, LedCommand, LedPattern, Notification, WireProtocol};
pub use device::{DeviceId, DeviceInfo, ScanFilter};
pub use error::{RadioError, SessionError};
pub use manager::BluetoothManager;
#[cfg(feature = "bluest")]
pub use platform::BluestRadio;
pub use radio::{
    event_channel, Radio, RadioEvent, RadioEventReceiver, RadioEventSender, RadioResult,
};
pub use session::DeviceSession;
pub use sink::{ChannelSink, EventSink, SessionEvent};
pub use state::{status_text, SessionState, Trigger};
pub use timer::ScheduledTask;
pub use types::{Characteristics, DisconnectReason, LedStatus, SessionSnapshot, ShotEvent};
