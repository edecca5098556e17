//! System configuration parameters
//!
//! All tunable parameters for the AquaSense monitor.
//! Values can be overridden via NVS (postcard blob, see [`NvsAdapter`]).
//!
//! [`NvsAdapter`]: crate::adapters::nvs::NvsAdapter

use serde::{Deserialize, Serialize};

/// Which pH conversion is applied to the amplifier voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhModel {
    /// Factory line `pH = -8.85·v + 22.2`; ignores stored calibration points.
    Fixed,
    /// Line through the stored 6.86 and 9.18 buffer voltages.
    TwoPoint,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Sampling cadence ---
    /// Length of one sample epoch (seconds).  One publish set per epoch.
    pub sample_interval_secs: u32,
    /// Coordinator tick period (milliseconds)
    pub tick_interval_ms: u32,

    // --- Converter arbitration ---
    /// Max wait for the converter during a sampling cycle (milliseconds)
    pub sampling_lock_timeout_ms: u32,
    /// Max wait for the converter during a calibration run (milliseconds)
    pub calibration_lock_timeout_ms: u32,
    /// Settle time after power-up before the first conversion (milliseconds)
    pub settle_ms: u32,

    // --- Averaging ---
    /// Conversions averaged per reading
    pub samples_per_reading: u16,
    /// Gap between averaged conversions (milliseconds)
    pub sample_spacing_ms: u32,

    // --- Derivation ---
    pub ph_model: PhModel,

    // --- Connectivity ---
    /// MQTT broker URI, e.g. `mqtt://broker.local:1883`
    pub broker_uri: heapless::String<96>,
    /// POSIX TZ string applied before local-time conversion
    pub timezone: heapless::String<48>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut broker_uri = heapless::String::new();
        let _ = broker_uri.push_str("mqtt://192.168.0.110:1883");
        let mut timezone = heapless::String::new();
        let _ = timezone.push_str("UTC0");

        Self {
            // Sampling
            sample_interval_secs: 3600, // hourly
            tick_interval_ms: 1000,     // 1 Hz

            // Arbitration
            sampling_lock_timeout_ms: 2500,
            calibration_lock_timeout_ms: 6000,
            settle_ms: 100,

            // Averaging
            samples_per_reading: 10,
            sample_spacing_ms: 20,

            // Derivation
            ph_model: PhModel::Fixed,

            broker_uri,
            timezone,
        }
    }
}
