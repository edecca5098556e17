//! Total dissolved solids from the conductivity probe voltage.
//!
//! The probe voltage is first normalised to 25 °C with a 2 %/°C linear
//! coefficient, then mapped through the vendor cubic and the stored
//! correction factor.

/// Reference temperature for compensation (°C).
pub const REFERENCE_C: f32 = 25.0;
/// Linear temperature coefficient per °C.
pub const TEMP_COEFFICIENT: f32 = 0.02;
/// Fixed offset subtracted after the cubic.
pub const OFFSET_PPM: f32 = 59.0;

/// Temperature-compensated voltage: `v / (1 + 0.02·(T − 25))`.
///
/// Returns `None` when the compensation factor is zero or negative
/// (T ≤ −25 °C), where the probe is frozen anyway.
pub fn compensate(voltage: f32, temperature_c: f32) -> Option<f32> {
    let k = 1.0 + TEMP_COEFFICIENT * (temperature_c - REFERENCE_C);
    if k <= 0.0 {
        return None;
    }
    Some(voltage / k)
}

/// TDS in ppm, clamped at 0.
pub fn tds_ppm(voltage: f32, temperature_c: f32, correction_factor: f32) -> f32 {
    let Some(v) = compensate(voltage, temperature_c) else {
        return 0.0;
    };
    let ppm = (133.42 * v * v * v - 255.86 * v * v + 857.39 * v) * 0.5 * correction_factor
        - OFFSET_PPM;
    ppm.max(0.0)
}
