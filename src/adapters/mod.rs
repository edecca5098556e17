//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to               |
//! |-------------|---------------------|---------------------------|
//! | `device_id` | (none)              | eFuse station MAC         |
//! | `log_sink`  | EventSink           | Serial log output         |
//! |             | Publisher           | Serial log (simulation)   |
//! | `mqtt`      | Publisher           | ESP-IDF MQTT client       |
//! | `nvs`       | ConfigPort          | NVS / in-memory store     |
//! |             | StoragePort         |                           |
//! | `ota`       | FirmwareUpdater     | HTTP client + esp-ota     |
//! | `time`      | Clock               | SNTP-synced system time   |
//! | `wifi`      | (none)              | ESP-IDF WiFi STA          |

pub mod device_id;
pub mod log_sink;
#[cfg(target_os = "espidf")]
pub mod mqtt;
pub mod nvs;
pub mod ota;
pub mod time;
pub mod wifi;
