use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use bluest::{Adapter, AdvertisingDevice, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use regex::Regex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::device::{DeviceId, DeviceInfo};
use crate::core::bluetooth::radio::{RadioEvent, RadioEventSender};

static MAC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").expect("MAC address pattern is valid")
});

/// Devices seen by the scanner, keyed by the id reported to the session
pub type DeviceMap = Arc<Mutex<HashMap<DeviceId, Device>>>;

pub struct BluetoothScanner {
    adapter: Adapter,
    devices: DeviceMap,
    events: RadioEventSender,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, devices: DeviceMap, events: RadioEventSender) -> Self {
        Self {
            adapter,
            devices,
            events,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    pub async fn start_scan(&mut self, services: Vec<Uuid>) -> Result<()> {
        if self.scan_task_handle.is_some() {
            self.stop_scan().await?;
        }
        // Clear existing devices
        self.devices.lock().await.clear();

        self.cancel_token = CancellationToken::new();
        let cancel_token_for_task = self.cancel_token.clone();
        let adapter_for_task = self.adapter.clone();
        let devices_for_task = self.devices.clone();
        let events_for_task = self.events.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = Self::internal_scan_task(
                adapter_for_task,
                devices_for_task,
                events_for_task,
                cancel_token_for_task,
                services,
            )
            .await
            {
                error!("Scan task failed: {}", e);
            }
        });

        self.scan_task_handle = Some(handle);
        info!("Device scan task started.");
        Ok(())
    }

    /// Reports every advertisement until cancelled
    async fn internal_scan_task(
        adapter: Adapter,
        devices: DeviceMap,
        events: RadioEventSender,
        cancel_token: CancellationToken,
        services: Vec<Uuid>,
    ) -> Result<()> {
        info!("Starting bluetooth scan");
        let mut scan_stream = adapter.scan(&services).await?;

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            let info = Self::device_info(&discovered_device);
                            debug!(
                                "Found device - ID: {}, Name: {:?}, RSSI: {:?}",
                                info.id, info.name, info.rssi
                            );

                            devices.lock().await.insert(info.id.clone(), discovered_device.device);
                            if events.send(RadioEvent::DeviceDiscovered(info)).is_err() {
                                info!("Session is gone, ending scan.");
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn stop_scan(&mut self) -> Result<()> {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        // wait for the scan task so the platform scan is really stopped
        if let Some(handle) = self.scan_task_handle.take() {
            match handle.await {
                Ok(()) => info!("Scan task finished after cancellation."),
                Err(e) if e.is_cancelled() => info!("Scan task was cancelled."),
                Err(e) => error!("Scan task finished with an unexpected join error: {:?}", e),
            }
        } else {
            debug!("No active scan task to stop.");
        }
        Ok(())
    }

    fn device_info(discovered: &AdvertisingDevice) -> DeviceInfo {
        let device = &discovered.device;
        let id = device.id().to_string();
        let name = discovered
            .adv_data
            .local_name
            .clone()
            .or_else(|| device.name().ok());

        let info = DeviceInfo::new(DeviceId::new(id.clone()), name, discovered.rssi)
            .with_services(discovered.adv_data.services.to_vec());
        match Self::extract_mac_address(&id) {
            Some(address) => info.with_address(address),
            None => info,
        }
    }

    fn extract_mac_address(device_id_str: &str) -> Option<String> {
        MAC_ADDRESS
            .find_iter(device_id_str)
            .last()
            .map(|m| m.as_str().to_uppercase())
    }
}
