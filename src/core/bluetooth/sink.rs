//! Event sink for session collaborators
//! Game logic implements [`EventSink`] to hear about state changes and shots.

use tokio::sync::mpsc;

use crate::core::bluetooth::device::DeviceInfo;
use crate::core::bluetooth::state::SessionState;
use crate::core::bluetooth::types::{DisconnectReason, ShotEvent};

/// Receives session events. Called synchronously, in the order the events
/// occur, while the session is locked: implementations must not block and
/// must not call back into the session manager inline.
pub trait EventSink: Send + Sync {
    fn on_state_changed(
        &self,
        old: SessionState,
        new: SessionState,
        reason: Option<&DisconnectReason>,
    );

    fn on_shot_detected(&self, event: &ShotEvent);

    /// A matching device was seen while scanning
    fn on_device_discovered(&self, _device: &DeviceInfo) {}
}

/// Owned form of the sink callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        old: SessionState,
        new: SessionState,
        reason: Option<DisconnectReason>,
    },
    ShotDetected(ShotEvent),
    DeviceDiscovered(DeviceInfo),
}

/// Forwards every callback into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("Session event dropped: receiver closed");
        }
    }
}

impl EventSink for ChannelSink {
    fn on_state_changed(
        &self,
        old: SessionState,
        new: SessionState,
        reason: Option<&DisconnectReason>,
    ) {
        self.forward(SessionEvent::StateChanged {
            old,
            new,
            reason: reason.cloned(),
        });
    }

    fn on_shot_detected(&self, event: &ShotEvent) {
        self.forward(SessionEvent::ShotDetected(event.clone()));
    }

    fn on_device_discovered(&self, device: &DeviceInfo) {
        self.forward(SessionEvent::DeviceDiscovered(device.clone()));
    }
}
