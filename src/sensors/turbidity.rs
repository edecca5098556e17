//! Turbidity from the raw conversion of the optical sensor.
//!
//! The sensor output drops as suspended solids scatter more light.  A raw
//! count of [`CLEAR_WATER_RAW`] or above is clear water (0 %); a count of
//! zero is fully opaque (100 %).

/// Raw count measured in clear water during board bring-up.
pub const CLEAR_WATER_RAW: f32 = 2300.0;

/// Turbidity percentage, clamped at 0 for readings above the clear-water
/// reference.  Negative raw counts are impossible on the converter and
/// are not clamped.
pub fn turbidity_percent(raw: f32) -> f32 {
    ((1.0 - raw / CLEAR_WATER_RAW) * 100.0).max(0.0)
}
