//! Notification handling for the Smart Hole
//! This module handles setting up and forwarding shot sensor notifications

use std::sync::Arc;

use anyhow::{anyhow, Result};
use bluest::{Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::device::DeviceId;
use crate::core::bluetooth::radio::{RadioEvent, RadioEventSender};

/// Notification handler for the shot sensor
#[derive(Clone)]
pub struct NotificationHandler {
    events: RadioEventSender,
    cancel_token: Arc<Mutex<CancellationToken>>,
}

impl NotificationHandler {
    pub fn new(events: RadioEventSender) -> Self {
        Self {
            events,
            cancel_token: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Subscribes to `notify_char` and forwards every value as a radio event.
    /// Returns once the subscription is active.
    pub async fn setup_notifications(
        &self,
        device_id: DeviceId,
        device: Device,
        notify_char: Characteristic,
    ) -> Result<()> {
        info!("Subscribing to notifications...");

        let token = CancellationToken::new();
        {
            let mut current = self.cancel_token.lock().await;
            current.cancel();
            *current = token.clone();
        }

        let events = self.events.clone();
        let (subscribed_tx, subscribed_rx) = oneshot::channel();

        // Start task to process notifications
        tokio::spawn(async move {
            Self::process_notifications(
                device_id,
                device,
                notify_char,
                events,
                token,
                subscribed_tx,
            )
            .await;
        });

        subscribed_rx
            .await
            .map_err(|_| anyhow!("Notification task ended before subscribing"))?
    }

    async fn process_notifications(
        device_id: DeviceId,
        device: Device,
        notify_char: Characteristic,
        events: RadioEventSender,
        token: CancellationToken,
        subscribed: oneshot::Sender<Result<()>>,
    ) {
        let mut notification_stream = match notify_char.notify().await {
            Ok(stream) => {
                let _ = subscribed.send(Ok(()));
                stream
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = subscribed.send(Err(e.into()));
                return;
            }
        };
        info!("Listening for shot sensor notifications...");

        loop {
            tokio::select! {
                result = notification_stream.next() => {
                    match result {
                        Some(Ok(value)) => {
                            debug!("Received shot sensor data: {:?}", value);
                            let event = RadioEvent::Notification {
                                device: device_id.clone(),
                                characteristic: notify_char.uuid(),
                                payload: value,
                            };
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                _ = token.cancelled() => {
                    info!("Notifications stopped");
                    return;
                }
            }
        }

        info!("Notification stream ended");
        if !device.is_connected().await {
            let _ = events.send(RadioEvent::Disconnected {
                device: device_id,
                reason: Some("link lost".to_string()),
            });
        }
    }

    pub async fn stop_notifications(&self) {
        self.cancel_token.lock().await.cancel();
    }
}
