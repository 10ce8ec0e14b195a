use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use smart_hole_link::core::bluetooth::{event_channel, BluestRadio, ChannelSink, SessionEvent};
use smart_hole_link::logging::init_logging;
use smart_hole_link::{AppConfig, BluetoothManager, LedColor, LedPattern, SessionState};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load_config(&config_path).await?;
    init_logging(&config.log_filter);

    let (events, radio_events) = event_channel();
    let radio = Arc::new(BluestRadio::new(events).await?);
    let manager = BluetoothManager::new(radio, radio_events, config.session).await;

    let (sink, mut session_events) = ChannelSink::new();
    manager.set_event_sink(Some(Arc::new(sink))).await;

    manager.start_scanning().await?;
    println!("{}", manager.status_text().await);

    loop {
        tokio::select! {
            event = session_events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::StateChanged { new, .. } => {
                        println!("{}", manager.status_text().await);
                        match new {
                            SessionState::Ready => {
                                if let Err(e) = manager.set_led_color(LedColor::White).await {
                                    error!("Failed to set LED color: {}", e);
                                }
                                if let Err(e) = manager.set_led_pattern(LedPattern::Solid).await {
                                    error!("Failed to set LED pattern: {}", e);
                                }
                            }
                            SessionState::Disconnected => break,
                            _ => {}
                        }
                    }
                    SessionEvent::ShotDetected(shot) => {
                        println!(
                            "Shot #{} detected at {}",
                            shot.shot_number,
                            shot.detected_at.format("%H:%M:%S")
                        );
                        if let Err(e) = manager.celebrate().await {
                            error!("Celebration failed: {}", e);
                        }
                    }
                    SessionEvent::DeviceDiscovered(device) => {
                        info!("Discovered {} ({:?} dBm)", device.display_name(), device.rssi);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, disconnecting");
                manager.disconnect().await?;
                break;
            }
        }
    }

    Ok(())
}
