//! Constants used throughout the Bluetooth layer
//! This module contains the Smart Hole GATT identity (UUIDs), the default
//! scan filter markers and the default timings.

use uuid::Uuid;

/// Human readable product name, used in logs and status lines
pub const DEVICE_PRODUCT_NAME: &str = "Smart Hole";

/// Name fragments a Smart Hole advertises when no service filter is applied
pub const DEFAULT_NAME_MARKERS: [&str; 2] = ["ESP32", "BackyardGolf"];

/// The UUID of the Smart Hole service
pub const UUID_SMART_HOLE_SERVICE: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// The UUID of the LED control characteristic (write)
pub const UUID_LED_CONTROL_CHAR: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// The UUID of the shot sensor characteristic (notify)
pub const UUID_SHOT_SENSOR_CHAR: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a9);

/// How long a scan may run without a match before it is stopped, in seconds
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 10;

/// How long the celebration flash is held before returning to solid, in seconds
pub const DEFAULT_CELEBRATION_HOLD_SECS: u64 = 3;

/// How long `is_available` waits for the adapter to report ready, in milliseconds
pub const ADAPTER_CHECK_TIMEOUT_MS: u64 = 500;

/// Token the shot sensor firmware puts in every shot notification
pub const SHOT_DETECTED_TOKEN: &str = "SHOT_DETECTED";
