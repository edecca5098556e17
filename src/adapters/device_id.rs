//! Device identity derived from the ESP32 factory MAC address.
//!
//! The ID is the full station MAC in colon-separated uppercase hex
//! (`AA:BB:CC:DD:EE:FF`).  It is stable across reboots and is embedded in
//! every MQTT topic the device publishes or subscribes to.

use core::fmt::Write;

use crate::app::telemetry::DeviceId;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the Wi-Fi station MAC from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the six bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_read_mac(
            mac.as_mut_ptr(),
            esp_idf_svc::sys::esp_mac_type_t_ESP_MAC_WIFI_STA,
        );
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Format: `AA:BB:CC:DD:EE:FF`.
pub fn device_id(mac: &MacAddress) -> DeviceId {
    let mut id = DeviceId::new();
    let _ = write!(
        id,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    id
}

/// MQTT client id: `aquasense-aabbccddeeff`.
pub fn client_id(mac: &MacAddress) -> heapless::String<32> {
    let mut name = heapless::String::<32>::new();
    let _ = write!(name, "aquasense-");
    for b in mac {
        let _ = write!(name, "{:02x}", b);
    }
    name
}
