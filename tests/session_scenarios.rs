//! End-to-end session behavior against a scripted radio.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use smart_hole_link::core::bluetooth::constants::{
    UUID_LED_CONTROL_CHAR, UUID_SHOT_SENSOR_CHAR, UUID_SMART_HOLE_SERVICE,
};
use smart_hole_link::core::bluetooth::{
    event_channel, ChannelSink, DeviceInfo, RadioError, RadioEventSender, RadioResult, ScanFilter,
    SessionEvent,
};
use smart_hole_link::{
    BluetoothManager, CelebrationStyle, DeviceId, DisconnectReason, Radio, RadioEvent,
    SessionConfig, SessionError, SessionState, WireProtocol,
};

const HOLE_ID: &str = "hci0/dev_24_0A_C4_12_34_56";

/// Paused time still rounds timer deadlines to the millisecond
fn assert_elapsed(since: Instant, expected: Duration) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "expected {:?}, got {:?}",
        expected,
        elapsed
    );
}

/// Radio that answers requests by posting the events a real stack would.
struct FakeRadio {
    events: RadioEventSender,
    available: AtomicBool,
    /// Answer `connect` with `Connected` (otherwise the attempt hangs)
    auto_link: bool,
    connect_error: Option<String>,
    /// Report service discovery as failed with this reason
    discovery_error: Option<String>,
    subscribe_error: Option<String>,
    characteristics: Vec<Uuid>,
    writes: mpsc::UnboundedSender<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeRadio {
    fn new(events: RadioEventSender) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (writes, written) = mpsc::unbounded_channel();
        let radio = Self {
            events,
            available: AtomicBool::new(true),
            auto_link: true,
            connect_error: None,
            discovery_error: None,
            subscribe_error: None,
            characteristics: vec![UUID_LED_CONTROL_CHAR, UUID_SHOT_SENSOR_CHAR],
            writes,
            calls: Mutex::new(Vec::new()),
        };
        (radio, written)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Radio for FakeRadio {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn start_scan(&self, _filter: &ScanFilter) -> RadioResult<()> {
        self.record("start_scan");
        Ok(())
    }

    async fn stop_scan(&self) -> RadioResult<()> {
        self.record("stop_scan");
        Ok(())
    }

    async fn connect(&self, device: &DeviceId) -> RadioResult<()> {
        self.record(format!("connect {}", device));
        if let Some(reason) = &self.connect_error {
            let _ = self.events.send(RadioEvent::ConnectFailed {
                device: device.clone(),
                reason: reason.clone(),
            });
        } else if self.auto_link {
            let _ = self.events.send(RadioEvent::Connected(device.clone()));
        }
        Ok(())
    }

    async fn disconnect(&self, device: &DeviceId) -> RadioResult<()> {
        self.record(format!("disconnect {}", device));
        Ok(())
    }

    async fn discover_services(&self, device: &DeviceId, service: Uuid) -> RadioResult<()> {
        assert_eq!(service, UUID_SMART_HOLE_SERVICE);
        self.record("discover_services");
        let event = match &self.discovery_error {
            Some(reason) => RadioEvent::ServiceDiscoveryFailed {
                device: device.clone(),
                reason: reason.clone(),
            },
            None => RadioEvent::ServicesDiscovered {
                device: device.clone(),
                characteristics: self.characteristics.clone(),
            },
        };
        let _ = self.events.send(event);
        Ok(())
    }

    async fn write(
        &self,
        _device: &DeviceId,
        characteristic: Uuid,
        data: &[u8],
    ) -> RadioResult<()> {
        if characteristic != UUID_LED_CONTROL_CHAR {
            return Err(RadioError::CharacteristicNotFound(characteristic));
        }
        let _ = self.writes.send(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    async fn subscribe(&self, _device: &DeviceId, characteristic: Uuid) -> RadioResult<()> {
        self.record(format!("subscribe {}", characteristic));
        match &self.subscribe_error {
            Some(reason) => Err(RadioError::Platform(reason.clone())),
            None => Ok(()),
        }
    }
}

struct Harness {
    manager: BluetoothManager,
    radio: Arc<FakeRadio>,
    events: RadioEventSender,
    session_events: mpsc::UnboundedReceiver<SessionEvent>,
    written: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    async fn new(config: SessionConfig) -> Self {
        Self::with_radio(config, |_| {}).await
    }

    async fn with_radio(config: SessionConfig, setup: impl FnOnce(&mut FakeRadio)) -> Self {
        let (events, radio_events) = event_channel();
        let (mut radio, written) = FakeRadio::new(events.clone());
        setup(&mut radio);
        let radio = Arc::new(radio);

        let manager = BluetoothManager::new(radio.clone(), radio_events, config).await;
        let (sink, session_events) = ChannelSink::new();
        manager.set_event_sink(Some(Arc::new(sink))).await;

        Self {
            manager,
            radio,
            events,
            session_events,
            written,
        }
    }

    fn advertise(&self, id: &str, name: &str, rssi: i16) {
        let device = DeviceInfo::new(DeviceId::from(id), Some(name.to_string()), Some(rssi));
        self.events
            .send(RadioEvent::DeviceDiscovered(device))
            .unwrap();
    }

    fn notify(&self, payload: &[u8]) {
        self.events
            .send(RadioEvent::Notification {
                device: DeviceId::from(HOLE_ID),
                characteristic: UUID_SHOT_SENSOR_CHAR,
                payload: payload.to_vec(),
            })
            .unwrap();
    }

    /// Next state change, skipping discovery notices
    async fn next_transition(&mut self) -> (SessionState, SessionState, Option<DisconnectReason>) {
        loop {
            match self.session_events.recv().await.expect("sink closed") {
                SessionEvent::StateChanged { old, new, reason } => return (old, new, reason),
                SessionEvent::ShotDetected(shot) => panic!("unexpected shot {:?}", shot),
                SessionEvent::DeviceDiscovered(_) => {}
            }
        }
    }

    async fn wait_for(&mut self, state: SessionState) {
        while self.next_transition().await.1 != state {}
    }

    async fn ready(&mut self) {
        self.manager.start_scanning().await.unwrap();
        self.advertise(HOLE_ID, "BackyardGolf-ESP32", -48);
        self.wait_for(SessionState::Ready).await;
    }

    /// Lets queued radio events and timers that are already due run
    async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn drain_writes(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.written.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn drain_transitions(&mut self) -> Vec<(SessionState, SessionState)> {
        let mut transitions = Vec::new();
        while let Ok(event) = self.session_events.try_recv() {
            if let SessionEvent::StateChanged { old, new, .. } = event {
                transitions.push((old, new));
            }
        }
        transitions
    }
}

#[tokio::test(start_paused = true)]
async fn scan_times_out_when_no_hole_is_found() {
    let mut h = Harness::new(SessionConfig::default()).await;
    let started = Instant::now();

    h.manager.start_scanning().await.unwrap();
    assert_eq!(
        h.next_transition().await,
        (SessionState::Disconnected, SessionState::Scanning, None)
    );

    h.advertise("hci0/dev_11_22_33_44_55_66", "Headphones", -40);
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Scanning,
            SessionState::Disconnected,
            Some(DisconnectReason::ScanTimeout)
        )
    );
    assert_elapsed(started, Duration::from_secs(10));
    assert_eq!(h.manager.status_text().await, "Smart Hole not found");
    assert_eq!(h.radio.calls(), vec!["start_scan", "stop_scan"]);
}

#[tokio::test(start_paused = true)]
async fn full_connect_reports_four_transitions() {
    let mut h = Harness::new(SessionConfig::default()).await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "BackyardGolf-ESP32", -48);

    let mut transitions = Vec::new();
    for _ in 0..4 {
        let (old, new, reason) = h.next_transition().await;
        assert_eq!(reason, None);
        transitions.push((old, new));
    }
    assert_eq!(
        transitions,
        vec![
            (SessionState::Disconnected, SessionState::Scanning),
            (SessionState::Scanning, SessionState::Connecting),
            (SessionState::Connecting, SessionState::Connected),
            (SessionState::Connected, SessionState::Ready),
        ]
    );

    h.settle().await;
    assert!(h.drain_transitions().is_empty());
    assert!(h.manager.is_ready().await);
    assert_eq!(h.manager.status_text().await, "Ready");
    assert_eq!(h.manager.rssi().await, Some(-48));
    assert_eq!(
        h.manager.connected_device().await.map(|d| d.id),
        Some(DeviceId::from(HOLE_ID))
    );
    assert_eq!(
        h.radio.calls(),
        vec![
            "start_scan".to_string(),
            "stop_scan".to_string(),
            format!("connect {}", HOLE_ID),
            "discover_services".to_string(),
            format!("subscribe {}", UUID_SHOT_SENSOR_CHAR),
        ]
    );

    // the scan timeout was cancelled by the match
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.manager.is_ready().await);
}

#[tokio::test(start_paused = true)]
async fn celebration_returns_to_solid_after_three_seconds() {
    let mut h = Harness::new(SessionConfig::default()).await;
    h.ready().await;

    let started = Instant::now();
    h.manager.celebrate().await.unwrap();
    assert_eq!(h.drain_writes(), vec!["LED_COLOR:GREEN", "LED_PATTERN:FLASH"]);

    let frame = h.written.recv().await.unwrap();
    assert_eq!(frame, "LED_PATTERN:SOLID");
    assert_elapsed(started, Duration::from_secs(3));

    let led = h.manager.led_status().await;
    assert_eq!(led.color.as_deref(), Some("GREEN"));
    assert_eq!(led.pattern.as_deref(), Some("SOLID"));
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_celebration() {
    let mut h = Harness::new(SessionConfig::default()).await;
    h.ready().await;

    h.manager.celebrate().await.unwrap();
    assert_eq!(h.drain_writes().len(), 2);

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.manager.disconnect().await.unwrap();
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Ready,
            SessionState::Disconnected,
            Some(DisconnectReason::Requested)
        )
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    h.settle().await;
    assert!(h.drain_writes().is_empty());
    assert!(h.radio.calls().contains(&format!("disconnect {}", HOLE_ID)));
}

#[tokio::test(start_paused = true)]
async fn new_celebration_replaces_pending_one() {
    let mut h = Harness::new(SessionConfig::default()).await;
    h.ready().await;

    h.manager.celebrate().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let second = Instant::now();
    h.manager.celebrate().await.unwrap();
    assert_eq!(h.drain_writes().len(), 4);

    assert_eq!(h.written.recv().await.unwrap(), "LED_PATTERN:SOLID");
    assert_elapsed(second, Duration::from_secs(3));
    h.settle().await;
    assert!(h.drain_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shot_notification_delivers_one_event() {
    let mut h = Harness::new(SessionConfig::default()).await;
    h.ready().await;
    let before = h.manager.shot_count().await;

    h.notify(b"SHOT_DETECTED#42");

    let shot = loop {
        match h.session_events.recv().await.unwrap() {
            SessionEvent::ShotDetected(shot) => break shot,
            other => panic!("unexpected event {:?}", other),
        }
    };
    assert_eq!(shot.shot_number, before + 1);
    assert_eq!(shot.payload, "SHOT_DETECTED#42");
    assert_eq!(shot.rssi, Some(-48));

    h.settle().await;
    assert!(h.session_events.try_recv().is_err());
    assert_eq!(h.manager.shot_count().await, before + 1);
    // celebrate_on_shot is off by default
    assert!(h.drain_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unrecognized_notifications_are_ignored() {
    let mut h = Harness::new(SessionConfig::default()).await;
    h.ready().await;

    h.notify(b"BATTERY:87");
    h.notify(&[0xff, 0xfe, 0x00]);
    h.settle().await;

    assert!(h.session_events.try_recv().is_err());
    assert_eq!(h.manager.shot_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn shot_triggers_celebration_when_configured() {
    let config = SessionConfig {
        celebrate_on_shot: true,
        ..SessionConfig::default()
    };
    let mut h = Harness::new(config).await;
    h.ready().await;

    h.notify(b"SHOT_DETECTED");
    h.settle().await;
    assert_eq!(h.drain_writes(), vec!["LED_COLOR:GREEN", "LED_PATTERN:FLASH"]);
    assert_eq!(h.manager.shot_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn led_command_while_connecting_is_rejected() {
    let mut h =
        Harness::with_radio(SessionConfig::default(), |radio| radio.auto_link = false).await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "ESP32 Smart Hole", -60);
    h.wait_for(SessionState::Connecting).await;

    assert_eq!(
        h.manager.set_led_color("RED").await,
        Err(SessionError::NotConnected)
    );
    h.settle().await;
    assert!(h.drain_writes().is_empty());
    assert_eq!(h.manager.state().await, SessionState::Connecting);
    assert_eq!(h.manager.status_text().await, "Smart Hole found, connecting...");
}

#[tokio::test(start_paused = true)]
async fn guarded_commands_fail_while_disconnected() {
    let mut h = Harness::new(SessionConfig::default()).await;

    assert_eq!(h.manager.set_led_pattern("RAINBOW").await, Err(SessionError::NotConnected));
    assert_eq!(h.manager.set_power(true).await, Err(SessionError::NotConnected));
    assert_eq!(h.manager.toggle_power().await, Err(SessionError::NotConnected));
    assert_eq!(h.manager.celebrate().await, Err(SessionError::NotConnected));
    assert!(h.drain_writes().is_empty());
    assert_eq!(h.manager.state().await, SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn only_start_scanning_leaves_disconnected() {
    let mut h = Harness::new(SessionConfig::default()).await;

    // no-ops while disconnected
    h.manager.stop_scanning().await.unwrap();
    h.manager.disconnect().await.unwrap();
    assert_eq!(
        h.manager.connect(&DeviceId::from(HOLE_ID)).await,
        Err(SessionError::InvalidState {
            operation: "connect",
            state: SessionState::Disconnected,
        })
    );
    h.settle().await;
    assert!(h.drain_transitions().is_empty());

    h.manager.start_scanning().await.unwrap();
    assert_eq!(
        h.manager.start_scanning().await,
        Err(SessionError::InvalidState {
            operation: "start scanning",
            state: SessionState::Scanning,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn stop_scanning_cancels_the_timeout() {
    let mut h = Harness::new(SessionConfig::default()).await;

    h.manager.start_scanning().await.unwrap();
    h.next_transition().await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    h.manager.stop_scanning().await.unwrap();
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Scanning,
            SessionState::Disconnected,
            Some(DisconnectReason::ScanStopped)
        )
    );

    tokio::time::sleep(Duration::from_secs(20)).await;
    h.settle().await;
    assert!(h.drain_transitions().is_empty());
    assert_eq!(h.manager.last_reason().await, Some(DisconnectReason::ScanStopped));
}

#[tokio::test(start_paused = true)]
async fn scan_filter_skips_other_devices() {
    let config = SessionConfig {
        min_rssi: Some(-80),
        ..SessionConfig::default()
    };
    let mut h = Harness::new(config).await;

    h.manager.start_scanning().await.unwrap();
    h.advertise("hci0/dev_11_22_33_44_55_66", "Speaker", -30);
    h.advertise(HOLE_ID, "BackyardGolf", -95);
    h.settle().await;
    assert_eq!(h.manager.state().await, SessionState::Scanning);

    let advertised = DeviceInfo::new(DeviceId::from("hci0/dev_AA_BB_CC_DD_EE_FF"), None, Some(-70))
        .with_services(vec![UUID_SMART_HOLE_SERVICE]);
    h.events.send(RadioEvent::DeviceDiscovered(advertised)).unwrap();
    h.wait_for(SessionState::Ready).await;
    assert_eq!(
        h.manager.connected_device().await.map(|d| d.id),
        Some(DeviceId::from("hci0/dev_AA_BB_CC_DD_EE_FF"))
    );
}

#[tokio::test(start_paused = true)]
async fn manual_connect_waits_for_caller() {
    let config = SessionConfig {
        auto_connect: false,
        ..SessionConfig::default()
    };
    let mut h = Harness::new(config).await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "BackyardGolf", -55);

    let found = loop {
        match h.session_events.recv().await.unwrap() {
            SessionEvent::DeviceDiscovered(device) => break device,
            SessionEvent::StateChanged { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    };
    assert_eq!(found.id, DeviceId::from(HOLE_ID));
    h.settle().await;
    assert_eq!(h.manager.state().await, SessionState::Scanning);

    assert_eq!(
        h.manager.connect(&DeviceId::from("hci0/dev_00_00_00_00_00_01")).await,
        Err(SessionError::UnknownDevice(DeviceId::from("hci0/dev_00_00_00_00_00_01")))
    );
    h.manager.connect(&found.id).await.unwrap();
    h.wait_for(SessionState::Ready).await;
}

#[tokio::test(start_paused = true)]
async fn connection_failure_lands_in_disconnected() {
    let mut h = Harness::with_radio(SessionConfig::default(), |radio| {
        radio.connect_error = Some("timed out".to_string());
    })
    .await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "BackyardGolf", -55);

    let (old, new, reason) = loop {
        let transition = h.next_transition().await;
        if transition.1 == SessionState::Disconnected {
            break transition;
        }
    };
    assert_eq!(old, SessionState::Connecting);
    assert_eq!(new, SessionState::Disconnected);
    assert_eq!(reason, Some(DisconnectReason::ConnectionFailed("timed out".to_string())));
    assert_eq!(h.manager.status_text().await, "Connection failed: timed out");
    assert_eq!(h.manager.connected_device().await, None);
}

#[tokio::test(start_paused = true)]
async fn missing_characteristic_fails_service_discovery() {
    let mut h = Harness::with_radio(SessionConfig::default(), |radio| {
        radio.characteristics = vec![UUID_LED_CONTROL_CHAR];
    })
    .await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "BackyardGolf", -55);
    h.wait_for(SessionState::Connected).await;

    let (old, new, reason) = h.next_transition().await;
    assert_eq!((old, new), (SessionState::Connected, SessionState::Disconnected));
    assert!(matches!(
        reason,
        Some(DisconnectReason::ServiceDiscoveryFailed(ref r))
            if r.contains(&UUID_SHOT_SENSOR_CHAR.to_string())
    ));
    assert!(h.radio.calls().contains(&format!("disconnect {}", HOLE_ID)));
    assert!(!h.radio.calls().iter().any(|c| c.starts_with("subscribe")));
}

#[tokio::test(start_paused = true)]
async fn peer_disconnect_resets_session() {
    let mut h = Harness::new(SessionConfig::default()).await;
    h.ready().await;

    h.manager.set_led_color("blue").await.unwrap();
    h.notify(b"SHOT_DETECTED");
    h.settle().await;
    h.drain_transitions();
    assert_eq!(h.manager.shot_count().await, 1);

    h.events
        .send(RadioEvent::Disconnected {
            device: DeviceId::from(HOLE_ID),
            reason: None,
        })
        .unwrap();
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Ready,
            SessionState::Disconnected,
            Some(DisconnectReason::PeerDisconnected(None))
        )
    );

    let snapshot = h.manager.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Disconnected);
    assert_eq!(snapshot.status, "Smart Hole disconnected");
    assert_eq!(snapshot.shot_count, 0);
    assert_eq!(snapshot.led, Default::default());
    assert_eq!(snapshot.device, None);
    assert_eq!(snapshot.rssi, None);

    // a late notification from the old link is dropped
    h.notify(b"SHOT_DETECTED");
    h.settle().await;
    assert!(h.session_events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn adapter_loss_disconnects_and_blocks_scanning() {
    let mut h = Harness::new(SessionConfig::default()).await;
    h.ready().await;

    h.radio.available.store(false, Ordering::SeqCst);
    h.events.send(RadioEvent::AdapterUnavailable).unwrap();
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Ready,
            SessionState::Disconnected,
            Some(DisconnectReason::AdapterUnavailable)
        )
    );
    assert_eq!(h.manager.status_text().await, "Bluetooth not available");
    assert_eq!(h.manager.start_scanning().await, Err(SessionError::AdapterUnavailable));

    h.radio.available.store(true, Ordering::SeqCst);
    h.events.send(RadioEvent::AdapterAvailable).unwrap();
    h.settle().await;
    h.manager.start_scanning().await.unwrap();
    assert_eq!(h.manager.state().await, SessionState::Scanning);
}

#[tokio::test(start_paused = true)]
async fn unavailable_adapter_at_startup() {
    let mut h = Harness::with_radio(SessionConfig::default(), |radio| {
        radio.available = AtomicBool::new(false);
    })
    .await;

    assert_eq!(h.manager.start_scanning().await, Err(SessionError::AdapterUnavailable));
    assert_eq!(h.manager.state().await, SessionState::Disconnected);
    assert_eq!(h.manager.last_reason().await, Some(DisconnectReason::AdapterUnavailable));
    assert_eq!(h.manager.status_text().await, "Bluetooth not available");
    h.settle().await;
    assert!(h.drain_transitions().is_empty());
    assert!(h.radio.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn legacy_protocol_and_power_toggle() {
    let config = SessionConfig {
        protocol: WireProtocol::Legacy,
        ..SessionConfig::default()
    };
    let mut h = Harness::new(config).await;
    h.ready().await;

    h.manager.set_led_color(" red ").await.unwrap();
    h.manager.set_led_pattern("pulse").await.unwrap();
    assert!(h.manager.toggle_power().await.unwrap());
    assert!(!h.manager.toggle_power().await.unwrap());

    assert_eq!(
        h.drain_writes(),
        vec!["COLOR_RED", "PATTERN_PULSE", "LED_ON", "LED_OFF"]
    );
    let led = h.manager.led_status().await;
    assert!(!led.is_on);
    assert_eq!(led.color.as_deref(), Some("RED"));
    assert_eq!(led.pattern.as_deref(), Some("PULSE"));
}

#[tokio::test(start_paused = true)]
async fn firmware_celebration_is_a_single_frame() {
    let config = SessionConfig {
        celebration: CelebrationStyle::Firmware,
        ..SessionConfig::default()
    };
    let mut h = Harness::new(config).await;
    h.ready().await;

    h.manager.celebrate().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    h.settle().await;
    assert_eq!(h.drain_writes(), vec!["CELEBRATION"]);
}

#[tokio::test(start_paused = true)]
async fn scanning_rechecks_adapter_that_came_up_silently() {
    let mut h = Harness::with_radio(SessionConfig::default(), |radio| {
        radio.available = AtomicBool::new(false);
    })
    .await;
    assert_eq!(h.manager.start_scanning().await, Err(SessionError::AdapterUnavailable));

    // powered on without an AdapterAvailable event
    h.radio.available.store(true, Ordering::SeqCst);
    h.manager.start_scanning().await.unwrap();
    assert_eq!(
        h.next_transition().await,
        (SessionState::Disconnected, SessionState::Scanning, None)
    );
    assert_eq!(h.manager.last_reason().await, None);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_connecting_cancels_the_attempt() {
    let mut h =
        Harness::with_radio(SessionConfig::default(), |radio| radio.auto_link = false).await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "BackyardGolf", -55);
    h.wait_for(SessionState::Connecting).await;

    h.manager.disconnect().await.unwrap();
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Connecting,
            SessionState::Disconnected,
            Some(DisconnectReason::Requested)
        )
    );
    assert!(h.radio.calls().contains(&format!("disconnect {}", HOLE_ID)));

    // the link coming up after the cancel is ignored
    h.events
        .send(RadioEvent::Connected(DeviceId::from(HOLE_ID)))
        .unwrap();
    h.settle().await;
    assert!(h.drain_transitions().is_empty());
    assert_eq!(h.manager.state().await, SessionState::Disconnected);
    assert!(!h.radio.calls().iter().any(|c| c == "discover_services"));
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_scanning_stops_the_scan() {
    let mut h = Harness::new(SessionConfig::default()).await;

    h.manager.start_scanning().await.unwrap();
    h.next_transition().await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    h.manager.disconnect().await.unwrap();
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Scanning,
            SessionState::Disconnected,
            Some(DisconnectReason::Requested)
        )
    );
    assert_eq!(h.radio.calls(), vec!["start_scan", "stop_scan"]);

    // the scan timeout never fires
    tokio::time::sleep(Duration::from_secs(20)).await;
    h.settle().await;
    assert!(h.drain_transitions().is_empty());
    assert_eq!(h.manager.last_reason().await, Some(DisconnectReason::Requested));
}

#[tokio::test(start_paused = true)]
async fn reported_discovery_failure_drops_the_link() {
    let mut h = Harness::with_radio(SessionConfig::default(), |radio| {
        radio.discovery_error = Some("GATT error 133".to_string());
    })
    .await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "BackyardGolf", -55);
    h.wait_for(SessionState::Connected).await;

    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Connected,
            SessionState::Disconnected,
            Some(DisconnectReason::ServiceDiscoveryFailed("GATT error 133".to_string()))
        )
    );
    assert_eq!(h.manager.status_text().await, "Service discovery failed: GATT error 133");
    assert!(h.radio.calls().contains(&format!("disconnect {}", HOLE_ID)));
}

#[tokio::test(start_paused = true)]
async fn subscribe_failure_fails_service_discovery() {
    let mut h = Harness::with_radio(SessionConfig::default(), |radio| {
        radio.subscribe_error = Some("notify refused".to_string());
    })
    .await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "BackyardGolf", -55);
    h.wait_for(SessionState::Connected).await;

    let (old, new, reason) = h.next_transition().await;
    assert_eq!((old, new), (SessionState::Connected, SessionState::Disconnected));
    assert!(matches!(
        reason,
        Some(DisconnectReason::ServiceDiscoveryFailed(ref r)) if r.contains("notify refused")
    ));
    assert!(h.radio.calls().contains(&format!("disconnect {}", HOLE_ID)));
    assert_eq!(h.manager.set_led_color("RED").await, Err(SessionError::NotConnected));
    assert!(h.drain_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn adapter_loss_while_scanning_cancels_the_timeout() {
    let mut h = Harness::new(SessionConfig::default()).await;

    h.manager.start_scanning().await.unwrap();
    h.next_transition().await;
    h.events.send(RadioEvent::AdapterUnavailable).unwrap();
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Scanning,
            SessionState::Disconnected,
            Some(DisconnectReason::AdapterUnavailable)
        )
    );

    tokio::time::sleep(Duration::from_secs(20)).await;
    h.settle().await;
    assert!(h.drain_transitions().is_empty());
    assert_eq!(h.manager.last_reason().await, Some(DisconnectReason::AdapterUnavailable));
}

#[tokio::test(start_paused = true)]
async fn adapter_loss_while_connecting() {
    let mut h =
        Harness::with_radio(SessionConfig::default(), |radio| radio.auto_link = false).await;

    h.manager.start_scanning().await.unwrap();
    h.advertise(HOLE_ID, "BackyardGolf", -55);
    h.wait_for(SessionState::Connecting).await;

    h.radio.available.store(false, Ordering::SeqCst);
    h.events.send(RadioEvent::AdapterUnavailable).unwrap();
    assert_eq!(
        h.next_transition().await,
        (
            SessionState::Connecting,
            SessionState::Disconnected,
            Some(DisconnectReason::AdapterUnavailable)
        )
    );
    assert_eq!(h.manager.connected_device().await, None);
    assert_eq!(h.manager.start_scanning().await, Err(SessionError::AdapterUnavailable));
}
