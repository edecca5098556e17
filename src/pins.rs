//! GPIO / peripheral pin assignments for the AquaSense probe board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Sensor power enables (digital outputs, active HIGH)
// ---------------------------------------------------------------------------

/// DS18B20 probe supply.
pub const TEMPERATURE_ENABLE_GPIO: i32 = 16;
/// Gravity TDS board supply.
pub const TDS_ENABLE_GPIO: i32 = 17;
/// pH amplifier board supply.
pub const PH_ENABLE_GPIO: i32 = 18;
/// Turbidity sensor supply.
pub const TURBIDITY_ENABLE_GPIO: i32 = 19;

/// Every sensor enable line, in [`SensorChannel`](crate::sensors::SensorChannel) order.
pub const SENSOR_ENABLE_GPIOS: [i32; 4] = [
    TEMPERATURE_ENABLE_GPIO,
    TDS_ENABLE_GPIO,
    PH_ENABLE_GPIO,
    TURBIDITY_ENABLE_GPIO,
];

// ---------------------------------------------------------------------------
// Sensors: analog (ADC1, oneshot mode)
// ---------------------------------------------------------------------------

/// TDS probe output, ADC1 channel 3 (GPIO 39 on ESP32).
pub const TDS_ADC_CHANNEL: u32 = 3;
/// pH amplifier output, ADC1 channel 4 (GPIO 32 on ESP32).
pub const PH_ADC_CHANNEL: u32 = 4;
/// Turbidity sensor output, ADC1 channel 5 (GPIO 33 on ESP32).
pub const TURBIDITY_ADC_CHANNEL: u32 = 5;

// ---------------------------------------------------------------------------
// Sensors: digital
// ---------------------------------------------------------------------------

/// DS18B20 one-wire data line (open-drain, external 4.7 kΩ pull-up).
pub const ONEWIRE_GPIO: i32 = 4;
