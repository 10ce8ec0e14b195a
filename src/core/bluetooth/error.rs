//! Error types for the Bluetooth layer

use thiserror::Error;

use crate::core::bluetooth::device::DeviceId;
use crate::core::bluetooth::state::SessionState;

/// Errors reported by a [`Radio`](crate::core::bluetooth::Radio) implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("Bluetooth adapter unavailable")]
    AdapterUnavailable,
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),
    #[error("characteristic not found: {0}")]
    CharacteristicNotFound(uuid::Uuid),
    #[error("{0}")]
    Platform(String),
}

/// Errors returned by session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The radio is off, unauthorized or unsupported
    #[error("Bluetooth adapter unavailable")]
    AdapterUnavailable,
    /// A guarded LED command was attempted outside the ready state
    #[error("not connected to the Smart Hole")]
    NotConnected,
    /// The operation is not accepted in the current state
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),
}
