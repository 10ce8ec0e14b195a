//! Radio backed by the platform Bluetooth stack through `bluest`

mod connection;
mod notification;
mod scanner;

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluest::{Adapter, AdapterEvent};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::bluetooth::constants::ADAPTER_CHECK_TIMEOUT_MS;
use crate::core::bluetooth::device::{DeviceId, ScanFilter};
use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::radio::{Radio, RadioEvent, RadioEventSender, RadioResult};

use connection::ConnectionManager;
use notification::NotificationHandler;
use scanner::{BluetoothScanner, DeviceMap};

fn platform_error(e: impl Display) -> RadioError {
    RadioError::Platform(e.to_string())
}

/// [`Radio`] implementation over the default system adapter
pub struct BluestRadio {
    adapter: Adapter,
    devices: DeviceMap,
    scanner: Mutex<BluetoothScanner>,
    connection_manager: ConnectionManager,
    notification_handler: NotificationHandler,
}

impl BluestRadio {
    /// Opens the default adapter. Events are reported on `events`.
    pub async fn new(events: RadioEventSender) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        info!("Bluetooth adapter opened");

        Self::watch_adapter(adapter.clone(), events.clone());

        let devices: DeviceMap = Arc::new(Mutex::new(HashMap::new()));
        Ok(Self {
            scanner: Mutex::new(BluetoothScanner::new(
                adapter.clone(),
                devices.clone(),
                events.clone(),
            )),
            connection_manager: ConnectionManager::new(adapter.clone(), events.clone()),
            notification_handler: NotificationHandler::new(events),
            adapter,
            devices,
        })
    }

    /// Forwards adapter power changes until the session goes away
    fn watch_adapter(adapter: Adapter, events: RadioEventSender) {
        tokio::spawn(async move {
            let mut adapter_events = match adapter.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Adapter events unavailable: {}", e);
                    return;
                }
            };
            while let Some(event) = adapter_events.next().await {
                let event = match event {
                    Ok(AdapterEvent::Available) => RadioEvent::AdapterAvailable,
                    Ok(AdapterEvent::Unavailable) => RadioEvent::AdapterUnavailable,
                    Err(e) => {
                        error!("Error in adapter event stream: {}", e);
                        continue;
                    }
                };
                debug!("Adapter event: {:?}", event);
                if events.send(event).is_err() {
                    break;
                }
            }
            info!("Adapter event stream ended");
        });
    }
}

#[async_trait]
impl Radio for BluestRadio {
    async fn is_available(&self) -> bool {
        let wait = Duration::from_millis(ADAPTER_CHECK_TIMEOUT_MS);
        matches!(tokio::time::timeout(wait, self.adapter.wait_available()).await, Ok(Ok(())))
    }

    async fn start_scan(&self, filter: &ScanFilter) -> RadioResult<()> {
        self.scanner
            .lock()
            .await
            .start_scan(filter.platform_services())
            .await
            .map_err(platform_error)
    }

    async fn stop_scan(&self) -> RadioResult<()> {
        self.scanner.lock().await.stop_scan().await.map_err(platform_error)
    }

    async fn connect(&self, device: &DeviceId) -> RadioResult<()> {
        let handle = self
            .devices
            .lock()
            .await
            .get(device)
            .cloned()
            .ok_or_else(|| RadioError::DeviceNotFound(device.clone()))?;
        self.connection_manager
            .connect(device.clone(), handle)
            .await
            .map_err(platform_error)
    }

    async fn disconnect(&self, device: &DeviceId) -> RadioResult<()> {
        self.notification_handler.stop_notifications().await;
        let handle = self.devices.lock().await.get(device).cloned();
        self.connection_manager.disconnect(handle).await.map_err(platform_error)
    }

    async fn discover_services(&self, device: &DeviceId, service: Uuid) -> RadioResult<()> {
        self.connection_manager
            .discover_services(device.clone(), service)
            .await
            .map_err(platform_error)
    }

    async fn write(
        &self,
        _device: &DeviceId,
        characteristic: Uuid,
        data: &[u8],
    ) -> RadioResult<()> {
        let write_char = self
            .connection_manager
            .characteristic(characteristic)
            .await
            .ok_or(RadioError::CharacteristicNotFound(characteristic))?;
        write_char.write(data).await.map_err(platform_error)
    }

    async fn subscribe(&self, device: &DeviceId, characteristic: Uuid) -> RadioResult<()> {
        let notify_char = self
            .connection_manager
            .characteristic(characteristic)
            .await
            .ok_or(RadioError::CharacteristicNotFound(characteristic))?;
        let handle = self
            .connection_manager
            .connected_device()
            .await
            .ok_or_else(|| RadioError::DeviceNotFound(device.clone()))?;
        self.notification_handler
            .setup_notifications(device.clone(), handle, notify_char)
            .await
            .map_err(platform_error)
    }
}
