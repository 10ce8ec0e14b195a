//! Smart Hole Link library
//! Manages the Bluetooth LE session with the Backyard Golf "Smart Hole"
//! target: scanning, connecting, LED commands and shot detection.
//!
//! Collaborators (game, achievements, UI) drive a
//! [`BluetoothManager`](crate::core::bluetooth::BluetoothManager) and implement
//! [`EventSink`](crate::core::bluetooth::EventSink) to hear about state changes and
//! shots. The platform radio is injected through the
//! [`Radio`](crate::core::bluetooth::Radio) trait; enable the `bluest` feature for
//! the real one.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod utils;

pub use crate::config::session_config::{CelebrationStyle, SessionConfig};
pub use crate::config::AppConfig;
pub use crate::core::bluetooth::{
    BluetoothManager, DeviceId, DeviceInfo, DisconnectReason, EventSink, LedColor, LedCommand,
    LedPattern, Radio, RadioEvent, SessionError, SessionState, ShotEvent, WireProtocol,
};
