//! Core functionality for Smart Hole Link
//! This module contains the Bluetooth session with the Smart Hole target

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, EventSink, SessionState, ShotEvent};
