//! Bluetooth connection handling for the Smart Hole
//! This module handles connecting to and disconnecting from the device and
//! discovering its characteristics.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bluest::{Adapter, Characteristic, Device};
use log::{error, info};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::device::DeviceId;
use crate::core::bluetooth::radio::{RadioEvent, RadioEventSender};

/// Represents the state of a successfully connected device.
/// This struct holds the active handles needed for interaction.
#[derive(Clone)]
pub struct ConnectedDeviceState {
    /// The device handle, used for things like checking connection status or disconnecting.
    pub device: Device,
    /// Characteristics of the Smart Hole service, once discovered
    pub characteristics: HashMap<Uuid, Characteristic>,
}

/// Connection manager for the Smart Hole
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    events: RadioEventSender,
    /// Token of the connection attempt in flight, if any
    pending: Arc<Mutex<Option<CancellationToken>>>,
    connected_state: Arc<Mutex<Option<ConnectedDeviceState>>>,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter, events: RadioEventSender) -> Self {
        Self {
            adapter,
            events,
            pending: Arc::new(Mutex::new(None)),
            connected_state: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts a connection attempt. The outcome is reported as a radio event.
    pub async fn connect(&self, device_id: DeviceId, device: Device) -> Result<()> {
        let token = CancellationToken::new();
        if let Some(previous) = self.pending.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Device details - ID: {}, Name: {:?}", device_id, name);

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let connected_state = self.connected_state.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                result = Self::try_connect(&adapter, &device) => result,
                _ = token.cancelled() => {
                    info!("Connection attempt to {} cancelled", device_id);
                    return;
                }
            };

            let event = match result {
                Ok(()) => {
                    *connected_state.lock().await = Some(ConnectedDeviceState {
                        device,
                        characteristics: HashMap::new(),
                    });
                    RadioEvent::Connected(device_id)
                }
                Err(e) => RadioEvent::ConnectFailed {
                    device: device_id,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });

        Ok(())
    }

    async fn try_connect(adapter: &Adapter, device: &Device) -> Result<()> {
        if !device.is_connected().await {
            info!("Initiating connection to {}...", device.id());
            adapter.connect_device(device).await?;
        }
        info!("Connection successful");
        Ok(())
    }

    /// Discovers the service's characteristics in the background and reports them
    pub async fn discover_services(&self, device_id: DeviceId, service_uuid: Uuid) -> Result<()> {
        let device = self
            .connected_device()
            .await
            .ok_or_else(|| anyhow!("No device connected"))?;

        let events = self.events.clone();
        let connected_state = self.connected_state.clone();

        tokio::spawn(async move {
            let event = match Self::discover_characteristics(&device, service_uuid).await {
                Ok(characteristics) => {
                    let uuids = characteristics.iter().map(|c| c.uuid()).collect();
                    if let Some(state) = connected_state.lock().await.as_mut() {
                        state.characteristics = characteristics
                            .into_iter()
                            .map(|c| (c.uuid(), c))
                            .collect();
                    }
                    RadioEvent::ServicesDiscovered {
                        device: device_id,
                        characteristics: uuids,
                    }
                }
                Err(e) => {
                    error!("Service discovery failed: {}", e);
                    RadioEvent::ServiceDiscoveryFailed {
                        device: device_id,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = events.send(event);
        });

        Ok(())
    }

    async fn discover_characteristics(
        device: &Device,
        service_uuid: Uuid,
    ) -> Result<Vec<Characteristic>> {
        info!("Discovering services...");
        let services = device.discover_services_with_uuid(service_uuid).await?;
        let service = services
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("Smart Hole service not found: {}", service_uuid))?;
        info!("Found Smart Hole service: {}", service.uuid());

        let characteristics = service.discover_characteristics().await?;
        for characteristic in &characteristics {
            info!("Available characteristic: {}", characteristic.uuid());
        }
        Ok(characteristics)
    }

    pub async fn characteristic(&self, uuid: Uuid) -> Option<Characteristic> {
        self.connected_state
            .lock()
            .await
            .as_ref()
            .and_then(|state| state.characteristics.get(&uuid).cloned())
    }

    pub async fn connected_device(&self) -> Option<Device> {
        self.connected_state
            .lock()
            .await
            .as_ref()
            .map(|state| state.device.clone())
    }

    /// Cancels an attempt in flight and drops the link
    pub async fn disconnect(&self, device: Option<Device>) -> Result<()> {
        if let Some(token) = self.pending.lock().await.take() {
            token.cancel();
        }

        // drop ConnectedDeviceState
        let connected = self.connected_state.lock().await.take().map(|state| state.device);
        info!("Connected state cleared, releasing device and characteristic objects.");

        let Some(device) = connected.or(device) else {
            return Ok(());
        };
        if device.is_connected().await {
            info!("Disconnecting from device {}", device.id());
            self.adapter.disconnect_device(&device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", device.id());
        }
        Ok(())
    }
}
