//! The per-device session record.
//!
//! [`DeviceSession`] holds everything the manager knows about the bound
//! peripheral and is only ever touched while the manager's lock is held.
//! All state changes go through [`DeviceSession::apply`], which consults the
//! transition table, performs the reset on entering `Disconnected` and
//! notifies the sink.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};

use crate::core::bluetooth::device::{DeviceId, DeviceInfo};
use crate::core::bluetooth::error::SessionError;
use crate::core::bluetooth::sink::EventSink;
use crate::core::bluetooth::state::{status_text, SessionState, Trigger};
use crate::core::bluetooth::timer::ScheduledTask;
use crate::core::bluetooth::types::{
    Characteristics, DisconnectReason, LedStatus, SessionSnapshot, ShotEvent,
};

/// State of one Smart Hole session
pub struct DeviceSession {
    state: SessionState,
    /// The peripheral being connected to / bound, if any
    device: Option<DeviceInfo>,
    characteristics: Characteristics,
    rssi: Option<i16>,
    led: LedStatus,
    shot_count: u64,
    last_reason: Option<DisconnectReason>,
    adapter_available: bool,
    /// Matching devices seen during the current scan
    discovered: HashMap<DeviceId, DeviceInfo>,
    sink: Option<Arc<dyn EventSink>>,
    scan_timer: Option<ScheduledTask>,
    celebration_timer: Option<ScheduledTask>,
}

impl DeviceSession {
    pub fn new(adapter_available: bool) -> Self {
        Self {
            state: SessionState::Disconnected,
            device: None,
            characteristics: Characteristics::default(),
            rssi: None,
            led: LedStatus::default(),
            shot_count: 0,
            last_reason: None,
            adapter_available,
            discovered: HashMap::new(),
            sink: None,
            scan_timer: None,
            celebration_timer: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device.as_ref().map(|device| &device.id)
    }

    pub fn characteristics(&self) -> Characteristics {
        self.characteristics
    }

    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    pub fn led(&self) -> &LedStatus {
        &self.led
    }

    pub fn led_mut(&mut self) -> &mut LedStatus {
        &mut self.led
    }

    pub fn shot_count(&self) -> u64 {
        self.shot_count
    }

    pub fn last_reason(&self) -> Option<&DisconnectReason> {
        self.last_reason.as_ref()
    }

    pub fn adapter_available(&self) -> bool {
        self.adapter_available
    }

    pub fn set_adapter_available(&mut self, available: bool) {
        self.adapter_available = available;
    }

    /// Records a failure that did not change state (e.g. scan refused because the adapter is off)
    pub fn record_reason(&mut self, reason: DisconnectReason) {
        self.last_reason = Some(reason);
    }

    pub fn set_sink(&mut self, sink: Option<Arc<dyn EventSink>>) {
        self.sink = sink;
    }

    pub fn status_text(&self) -> String {
        status_text(self.state, self.last_reason.as_ref())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            status: self.status_text(),
            last_reason: self.last_reason.clone(),
            device: self.device.clone(),
            rssi: self.rssi,
            led: self.led.clone(),
            shot_count: self.shot_count,
        }
    }

    /// Fails with `InvalidState` unless `trigger` is accepted right now
    pub fn ensure_accepts(
        &self,
        trigger: &Trigger,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        match self.state.next(trigger) {
            Some(_) => Ok(()),
            None => Err(SessionError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    /// Applies a trigger. Returns the new state, or `None` (and changes nothing)
    /// if the trigger is not accepted in the current state.
    pub fn apply(&mut self, trigger: Trigger) -> Option<SessionState> {
        let old = self.state;
        let Some(new) = old.next(&trigger) else {
            debug!("Ignoring {:?} while {}", trigger, old);
            return None;
        };

        let reason = trigger.reason(old);
        self.state = new;

        if new == SessionState::Disconnected {
            self.reset_peer();
            self.last_reason = reason.clone();
        } else if new == SessionState::Scanning {
            self.last_reason = None;
        }

        match &reason {
            Some(reason) => info!("Session {} -> {} ({})", old, new, reason),
            None => info!("Session {} -> {}", old, new),
        }
        if let Some(sink) = &self.sink {
            sink.on_state_changed(old, new, reason.as_ref());
        }
        Some(new)
    }

    /// Clears everything tied to the peripheral: handles, LED and shot state,
    /// pending scheduled actions.
    fn reset_peer(&mut self) {
        self.cancel_scan_timer();
        self.cancel_celebration();
        self.device = None;
        self.characteristics = Characteristics::default();
        self.rssi = None;
        self.led = LedStatus::default();
        self.shot_count = 0;
        self.discovered.clear();
    }

    /// Remembers a matching advertisement from the current scan
    pub fn remember_discovered(&mut self, device: DeviceInfo) {
        if let Some(sink) = &self.sink {
            sink.on_device_discovered(&device);
        }
        self.discovered.insert(device.id.clone(), device);
    }

    pub fn discovered(&self, id: &DeviceId) -> Option<&DeviceInfo> {
        self.discovered.get(id)
    }

    /// Binds the peripheral the session is about to connect to
    pub fn bind_device(&mut self, device: DeviceInfo) {
        self.rssi = device.rssi;
        self.device = Some(device);
    }

    pub fn bind_characteristics(&mut self, characteristics: Characteristics) {
        self.characteristics = characteristics;
    }

    pub fn set_scan_timer(&mut self, timer: ScheduledTask) {
        self.scan_timer = Some(timer);
    }

    pub fn cancel_scan_timer(&mut self) {
        if let Some(timer) = self.scan_timer.take() {
            timer.cancel();
        }
    }

    /// Installs a celebration follow-up, replacing any pending one
    pub fn set_celebration_timer(&mut self, timer: ScheduledTask) {
        self.cancel_celebration();
        self.celebration_timer = Some(timer);
    }

    pub fn cancel_celebration(&mut self) {
        if let Some(timer) = self.celebration_timer.take() {
            debug!("Cancelling pending celebration step");
            timer.cancel();
        }
    }

    pub fn finish_celebration(&mut self) {
        self.celebration_timer = None;
    }

    /// Counts a shot and delivers it to the sink
    pub fn record_shot(&mut self, payload: String) -> ShotEvent {
        self.shot_count += 1;
        let event = ShotEvent {
            shot_number: self.shot_count,
            detected_at: Utc::now(),
            payload,
            rssi: self.rssi,
        };
        info!("Shot #{} detected", event.shot_number);
        if let Some(sink) = &self.sink {
            sink.on_shot_detected(&event);
        }
        event
    }
}
