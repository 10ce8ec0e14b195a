//! The radio capability the session drives.
//!
//! A [`Radio`] issues requests to the platform Bluetooth stack and returns as
//! soon as the request is accepted. Outcomes (a discovered device, an
//! established link, resolved characteristics, notifications) are reported
//! asynchronously as [`RadioEvent`]s on the channel handed to the radio at
//! construction. The session drains that channel on a single task, so the
//! platform's callbacks are serialized before they reach the state machine.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::device::{DeviceId, DeviceInfo, ScanFilter};
use crate::core::bluetooth::error::RadioError;

pub type RadioResult<T> = Result<T, RadioError>;

/// Callbacks from the platform radio stack
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// The adapter was powered on / authorized
    AdapterAvailable,
    /// The adapter was powered off, unauthorized or is unsupported
    AdapterUnavailable,
    /// An advertisement was received while scanning
    DeviceDiscovered(DeviceInfo),
    /// A link requested with [`Radio::connect`] is up
    Connected(DeviceId),
    /// A link requested with [`Radio::connect`] could not be established
    ConnectFailed { device: DeviceId, reason: String },
    /// The link went down
    Disconnected { device: DeviceId, reason: Option<String> },
    /// Characteristics found in the service requested with [`Radio::discover_services`]
    ServicesDiscovered { device: DeviceId, characteristics: Vec<Uuid> },
    ServiceDiscoveryFailed { device: DeviceId, reason: String },
    /// A value notified on a subscribed characteristic
    Notification {
        device: DeviceId,
        characteristic: Uuid,
        payload: Vec<u8>,
    },
}

pub type RadioEventSender = mpsc::UnboundedSender<RadioEvent>;
pub type RadioEventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

/// Creates the channel a radio reports its events on
pub fn event_channel() -> (RadioEventSender, RadioEventReceiver) {
    mpsc::unbounded_channel()
}

/// Platform radio operations used by the session
#[async_trait]
pub trait Radio: Send + Sync {
    /// Whether the adapter is currently powered on and usable
    async fn is_available(&self) -> bool;

    /// Starts reporting advertisements as [`RadioEvent::DeviceDiscovered`]
    async fn start_scan(&self, filter: &ScanFilter) -> RadioResult<()>;

    async fn stop_scan(&self) -> RadioResult<()>;

    /// Requests a link to a device seen during the current scan.
    /// Reports [`RadioEvent::Connected`] or [`RadioEvent::ConnectFailed`].
    async fn connect(&self, device: &DeviceId) -> RadioResult<()>;

    /// Tears down the link, cancelling an in-flight connection attempt
    async fn disconnect(&self, device: &DeviceId) -> RadioResult<()>;

    /// Discovers `service` and its characteristics.
    /// Reports [`RadioEvent::ServicesDiscovered`] or [`RadioEvent::ServiceDiscoveryFailed`].
    async fn discover_services(&self, device: &DeviceId, service: Uuid) -> RadioResult<()>;

    /// Writes (with response) to a discovered characteristic
    async fn write(&self, device: &DeviceId, characteristic: Uuid, data: &[u8]) -> RadioResult<()>;

    /// Enables notifications on a discovered characteristic
    async fn subscribe(&self, device: &DeviceId, characteristic: Uuid) -> RadioResult<()>;
}
