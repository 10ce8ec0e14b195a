//! Bluetooth manager for the Smart Hole
//! This module provides the main interface for session operations: scanning,
//! connecting, LED commands, and the event sink.

use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::session_config::{CelebrationStyle, SessionConfig};
use crate::core::bluetooth::commands::{decode, LedColor, LedCommand, LedPattern, Notification};
use crate::core::bluetooth::constants::{
    DEVICE_PRODUCT_NAME, UUID_LED_CONTROL_CHAR, UUID_SHOT_SENSOR_CHAR, UUID_SMART_HOLE_SERVICE,
};
use crate::core::bluetooth::device::{DeviceId, DeviceInfo, ScanFilter};
use crate::core::bluetooth::error::SessionError;
use crate::core::bluetooth::radio::{Radio, RadioEvent, RadioEventReceiver};
use crate::core::bluetooth::session::DeviceSession;
use crate::core::bluetooth::sink::EventSink;
use crate::core::bluetooth::state::{SessionState, Trigger};
use crate::core::bluetooth::timer::ScheduledTask;
use crate::core::bluetooth::types::{
    Characteristics, DisconnectReason, LedStatus, SessionSnapshot,
};

/// Manages the session with one Smart Hole.
///
/// Cheap to clone; all clones drive the same session. Every operation and
/// every radio event is processed while holding the session lock, so state
/// transitions and command writes never interleave.
#[derive(Clone)]
pub struct BluetoothManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    radio: Arc<dyn Radio>,
    config: SessionConfig,
    filter: ScanFilter,
    session: Mutex<DeviceSession>,
}

impl BluetoothManager {
    /// Creates a new BluetoothManager driving `radio`. `events` must be the
    /// receiving end of the channel the radio reports on.
    pub async fn new(
        radio: Arc<dyn Radio>,
        events: RadioEventReceiver,
        config: SessionConfig,
    ) -> Self {
        let adapter_available = radio.is_available().await;
        if adapter_available {
            info!("Bluetooth adapter is available.");
        } else {
            warn!("Bluetooth adapter is not available yet.");
        }

        let inner = Arc::new(ManagerInner {
            radio,
            filter: config.scan_filter(),
            config,
            session: Mutex::new(DeviceSession::new(adapter_available)),
        });

        let pump = Arc::downgrade(&inner);
        tokio::spawn(async move {
            ManagerInner::run_event_pump(pump, events).await;
        });

        Self { inner }
    }

    /// Replaces the event sink. `None` detaches it. Events that already fired
    /// are not replayed to the new sink.
    pub async fn set_event_sink(&self, sink: Option<Arc<dyn EventSink>>) {
        self.inner.session.lock().await.set_sink(sink);
    }

    /// Starts scanning for the Smart Hole. The scan stops on its own after
    /// the configured timeout unless a device matches first.
    pub async fn start_scanning(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;

        // the startup check may have missed an adapter that was already on
        if !session.adapter_available() && inner.radio.is_available().await {
            info!("Bluetooth adapter is available.");
            session.set_adapter_available(true);
        }
        if !session.adapter_available() {
            warn!("Cannot scan: Bluetooth adapter unavailable");
            session.record_reason(DisconnectReason::AdapterUnavailable);
            return Err(SessionError::AdapterUnavailable);
        }
        session.ensure_accepts(&Trigger::StartScan, "start scanning")?;

        inner.radio.start_scan(&inner.filter).await?;
        session.apply(Trigger::StartScan);

        let timeout = inner.config.scan_timeout();
        let timer_inner = inner.clone();
        session.set_scan_timer(ScheduledTask::spawn(timeout, move |token| async move {
            timer_inner.on_scan_timeout(token).await;
        }));

        info!("Device scan started, giving up after {:?}.", timeout);
        Ok(())
    }

    /// Stops an active scan. Does nothing unless the session is scanning.
    pub async fn stop_scanning(&self) -> Result<(), SessionError> {
        let mut session = self.inner.session.lock().await;
        if session.state() != SessionState::Scanning {
            debug!("Not scanning, nothing to stop");
            return Ok(());
        }

        info!("Stopping Bluetooth scan.");
        session.cancel_scan_timer();
        if let Err(e) = self.inner.radio.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        session.apply(Trigger::ScanStopped);
        Ok(())
    }

    /// Connects to a device reported by the current scan. Only accepted while
    /// scanning; the link comes up asynchronously.
    pub async fn connect(&self, device_id: &DeviceId) -> Result<(), SessionError> {
        let mut session = self.inner.session.lock().await;
        session.ensure_accepts(&Trigger::DeviceMatched, "connect")?;

        let device = session
            .discovered(device_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownDevice(device_id.clone()))?;

        self.inner.begin_connect(&mut session, device).await;
        Ok(())
    }

    /// Returns the session to `Disconnected` from any state, cancelling the
    /// scan, an in-flight connection attempt and pending celebration steps.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        let state = session.state();
        if state == SessionState::Disconnected {
            debug!("Already disconnected");
            return Ok(());
        }

        session.cancel_celebration();
        session.cancel_scan_timer();

        if state == SessionState::Scanning {
            if let Err(e) = inner.radio.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        }
        if let Some(device_id) = session.device_id().cloned() {
            info!("Disconnecting from device {}", device_id);
            if let Err(e) = inner.radio.disconnect(&device_id).await {
                warn!("Failed to disconnect from {}: {}", device_id, e);
            }
        }

        session.apply(Trigger::DisconnectRequested);
        Ok(())
    }

    /// Sets the strip color (RED, GREEN, BLUE, ...)
    pub async fn set_led_color(&self, color: impl AsRef<str>) -> Result<(), SessionError> {
        self.send_command(LedCommand::color(color)).await
    }

    /// Sets the animation pattern (SOLID, FLASH, PULSE, RAINBOW, ...)
    pub async fn set_led_pattern(&self, pattern: impl AsRef<str>) -> Result<(), SessionError> {
        self.send_command(LedCommand::pattern(pattern)).await
    }

    /// Switches the strip on or off
    pub async fn set_power(&self, on: bool) -> Result<(), SessionError> {
        self.send_command(LedCommand::Power(on)).await
    }

    /// Flips the strip power and returns the new power state
    pub async fn toggle_power(&self) -> Result<bool, SessionError> {
        let mut session = self.inner.session.lock().await;
        let on = !session.led().is_on;
        self.inner.send_locked(&mut session, LedCommand::Power(on)).await?;
        Ok(on)
    }

    /// Plays the celebration. With the default style this is a green flash
    /// that returns to solid after the configured hold time.
    pub async fn celebrate(&self) -> Result<(), SessionError> {
        let mut session = self.inner.session.lock().await;
        self.inner.celebrate_locked(&mut session).await
    }

    /// Sends one LED command. Fails with `NotConnected` unless the session is ready.
    pub async fn send_command(&self, command: LedCommand) -> Result<(), SessionError> {
        let mut session = self.inner.session.lock().await;
        self.inner.send_locked(&mut session, command).await
    }

    pub async fn state(&self) -> SessionState {
        self.inner.session.lock().await.state()
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await.is_ready()
    }

    /// Status line for display, e.g. "Scanning for Smart Hole..."
    pub async fn status_text(&self) -> String {
        self.inner.session.lock().await.status_text()
    }

    pub async fn last_reason(&self) -> Option<DisconnectReason> {
        self.inner.session.lock().await.last_reason().cloned()
    }

    pub async fn shot_count(&self) -> u64 {
        self.inner.session.lock().await.shot_count()
    }

    pub async fn led_status(&self) -> LedStatus {
        self.inner.session.lock().await.led().clone()
    }

    pub async fn rssi(&self) -> Option<i16> {
        self.inner.session.lock().await.rssi()
    }

    /// The peripheral the session is connecting or connected to
    pub async fn connected_device(&self) -> Option<DeviceInfo> {
        self.inner.session.lock().await.device().cloned()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.session.lock().await.snapshot()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl ManagerInner {
    /// Drains radio events in arrival order until the radio goes away or the
    /// last manager handle is dropped.
    async fn run_event_pump(inner: Weak<ManagerInner>, mut events: RadioEventReceiver) {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.handle_radio_event(event).await;
        }
        debug!("Radio event pump stopped");
    }

    async fn handle_radio_event(self: &Arc<Self>, event: RadioEvent) {
        let mut session = self.session.lock().await;

        match event {
            RadioEvent::AdapterAvailable => {
                info!("Bluetooth adapter became available");
                session.set_adapter_available(true);
            }
            RadioEvent::AdapterUnavailable => {
                warn!("Bluetooth adapter became unavailable");
                session.set_adapter_available(false);
                if session.state() == SessionState::Disconnected {
                    session.record_reason(DisconnectReason::AdapterUnavailable);
                } else {
                    // the radio is gone, so there is nothing left to stop or disconnect
                    session.apply(Trigger::AdapterUnavailable);
                }
            }
            RadioEvent::DeviceDiscovered(device) => {
                self.on_device_discovered(&mut session, device).await;
            }
            RadioEvent::Connected(device_id) => {
                self.on_link_established(&mut session, &device_id).await;
            }
            RadioEvent::ConnectFailed { device, reason } => {
                if is_peer(&session, &device) {
                    error!("Failed to connect to {}: {}", device, reason);
                    session.apply(Trigger::LinkFailed(reason));
                }
            }
            RadioEvent::Disconnected { device, reason } => {
                if is_peer(&session, &device) {
                    info!("Device {} disconnected", device);
                    session.apply(Trigger::PeerDisconnected(reason));
                } else {
                    debug!("Ignoring disconnect of {}", device);
                }
            }
            RadioEvent::ServicesDiscovered {
                device,
                characteristics,
            } => {
                self.on_services_discovered(&mut session, &device, &characteristics)
                    .await;
            }
            RadioEvent::ServiceDiscoveryFailed { device, reason } => {
                if is_peer(&session, &device) && session.state() == SessionState::Connected {
                    self.fail_binding(&mut session, reason).await;
                }
            }
            RadioEvent::Notification {
                device,
                characteristic,
                payload,
            } => {
                self.on_notification(&mut session, &device, characteristic, &payload)
                    .await;
            }
        }
    }

    async fn on_device_discovered(&self, session: &mut DeviceSession, device: DeviceInfo) {
        if session.state() != SessionState::Scanning {
            debug!("Ignoring advertisement from {} while {}", device.id, session.state());
            return;
        }
        if !self.filter.matches(&device) {
            debug!(
                "Found device - ID: {}, Name: {:?}, RSSI: {:?} (no match)",
                device.id, device.name, device.rssi
            );
            return;
        }

        info!(
            "Found {} device: ID: {}, Name: {:?}, Address: {:?}, RSSI: {:?}",
            DEVICE_PRODUCT_NAME, device.id, device.name, device.address, device.rssi
        );
        session.remember_discovered(device.clone());

        if self.config.auto_connect {
            self.begin_connect(session, device).await;
        }
    }

    async fn begin_connect(&self, session: &mut DeviceSession, device: DeviceInfo) {
        session.cancel_scan_timer();
        if let Err(e) = self.radio.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        let device_id = device.id.clone();
        info!("Initiating connection to {} ({})...", device.display_name(), device_id);
        session.bind_device(device);
        session.apply(Trigger::DeviceMatched);

        if let Err(e) = self.radio.connect(&device_id).await {
            error!("Failed to start connection to {}: {}", device_id, e);
            session.apply(Trigger::LinkFailed(e.to_string()));
        }
    }

    async fn on_link_established(&self, session: &mut DeviceSession, device_id: &DeviceId) {
        if !is_peer(session, device_id) {
            debug!("Ignoring link to {}", device_id);
            return;
        }
        if session.apply(Trigger::LinkEstablished).is_none() {
            return;
        }

        info!("Connection successful, discovering services...");
        if let Err(e) = self.radio.discover_services(device_id, UUID_SMART_HOLE_SERVICE).await {
            self.fail_binding(session, e.to_string()).await;
        }
    }

    async fn on_services_discovered(
        &self,
        session: &mut DeviceSession,
        device_id: &DeviceId,
        found: &[Uuid],
    ) {
        if !is_peer(session, device_id) || session.state() != SessionState::Connected {
            debug!("Ignoring service discovery result for {}", device_id);
            return;
        }

        let characteristics = Characteristics {
            led_control: found.iter().copied().find(|uuid| *uuid == UUID_LED_CONTROL_CHAR),
            shot_sensor: found.iter().copied().find(|uuid| *uuid == UUID_SHOT_SENSOR_CHAR),
        };
        if characteristics.led_control.is_none() {
            let reason = format!("LED control characteristic not found: {}", UUID_LED_CONTROL_CHAR);
            return self.fail_binding(session, reason).await;
        }
        if characteristics.shot_sensor.is_none() {
            let reason = format!("Shot sensor characteristic not found: {}", UUID_SHOT_SENSOR_CHAR);
            return self.fail_binding(session, reason).await;
        }
        info!("Found LED control and shot sensor characteristics");

        info!("Subscribing to shot sensor notifications...");
        if let Err(e) = self.radio.subscribe(device_id, UUID_SHOT_SENSOR_CHAR).await {
            let reason = format!("Failed to subscribe to shot sensor: {}", e);
            return self.fail_binding(session, reason).await;
        }

        debug_assert!(characteristics.is_bound());
        session.bind_characteristics(characteristics);
        session.apply(Trigger::ServicesResolved);
        info!("{} ready", DEVICE_PRODUCT_NAME);
    }

    /// Service binding failed: drop the link and report the reason.
    async fn fail_binding(&self, session: &mut DeviceSession, reason: String) {
        error!("Service discovery failed: {}", reason);
        let device_id = session.device_id().cloned();
        session.apply(Trigger::ServiceDiscoveryFailed(reason));

        if let Some(device_id) = device_id {
            if let Err(e) = self.radio.disconnect(&device_id).await {
                warn!("Failed to disconnect from {}: {}", device_id, e);
            }
        }
    }

    async fn on_notification(
        self: &Arc<Self>,
        session: &mut DeviceSession,
        device_id: &DeviceId,
        characteristic: Uuid,
        payload: &[u8],
    ) {
        if !is_peer(session, device_id)
            || !session.state().is_ready()
            || session.characteristics().shot_sensor != Some(characteristic)
        {
            debug!("Ignoring notification on {} from {}", characteristic, device_id);
            return;
        }

        match decode(payload) {
            Notification::ShotDetected { payload } => {
                session.record_shot(payload);
                if self.config.celebrate_on_shot {
                    if let Err(e) = self.celebrate_locked(session).await {
                        warn!("Shot celebration failed: {}", e);
                    }
                }
            }
            Notification::Unrecognized => {
                warn!(
                    "Ignoring unrecognized shot sensor notification: {:?}",
                    String::from_utf8_lossy(payload)
                );
            }
        }
    }

    async fn on_scan_timeout(&self, token: CancellationToken) {
        let mut session = self.session.lock().await;
        if token.is_cancelled() || session.state() != SessionState::Scanning {
            return;
        }

        info!(
            "No {} found within {:?}, stopping scan.",
            DEVICE_PRODUCT_NAME,
            self.config.scan_timeout()
        );
        if let Err(e) = self.radio.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        session.apply(Trigger::ScanTimeout);
    }

    async fn celebrate_locked(
        self: &Arc<Self>,
        session: &mut DeviceSession,
    ) -> Result<(), SessionError> {
        match self.config.celebration {
            CelebrationStyle::Firmware => self.send_locked(session, LedCommand::Celebration).await,
            CelebrationStyle::Sequence => {
                info!("Starting celebration");
                self.send_locked(session, LedCommand::color(LedColor::Green)).await?;
                self.send_locked(session, LedCommand::pattern(LedPattern::Flash)).await?;

                let timer_inner = self.clone();
                session.set_celebration_timer(ScheduledTask::spawn(
                    self.config.celebration_hold(),
                    move |token| async move {
                        timer_inner.finish_celebration(token).await;
                    },
                ));
                Ok(())
            }
        }
    }

    /// Returns the strip to solid once the celebration hold has elapsed.
    async fn finish_celebration(&self, token: CancellationToken) {
        let mut session = self.session.lock().await;
        if token.is_cancelled() {
            return;
        }
        session.finish_celebration();

        if !session.state().is_ready() {
            debug!("Session no longer ready, skipping end of celebration");
            return;
        }
        if let Err(e) = self
            .send_locked(&mut session, LedCommand::pattern(LedPattern::Solid))
            .await
        {
            warn!("Failed to end celebration: {}", e);
        }
    }

    /// Encodes and writes a command to the LED characteristic. Only allowed
    /// while ready; nothing is queued otherwise.
    async fn send_locked(
        &self,
        session: &mut DeviceSession,
        command: LedCommand,
    ) -> Result<(), SessionError> {
        let (device_id, led_control) = match (
            session.state(),
            session.device_id(),
            session.characteristics().led_control,
        ) {
            (SessionState::Ready, Some(device_id), Some(led_control)) => {
                (device_id.clone(), led_control)
            }
            (state, _, _) => {
                warn!("Cannot send {:?}: not connected ({})", command, state);
                return Err(SessionError::NotConnected);
            }
        };

        let frame = command.to_wire(self.config.protocol);
        self.radio.write(&device_id, led_control, frame.as_bytes()).await?;
        info!("Sent command: {}", frame);

        let led = session.led_mut();
        match command {
            LedCommand::SetColor(name) => led.color = Some(name),
            LedCommand::SetPattern(name) => led.pattern = Some(name),
            LedCommand::Power(on) => led.is_on = on,
            LedCommand::Celebration => {}
        }
        Ok(())
    }
}

fn is_peer(session: &DeviceSession, device_id: &DeviceId) -> bool {
    session.device_id() == Some(device_id)
}
