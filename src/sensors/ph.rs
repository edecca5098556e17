//! pH from the amplifier output voltage.

use crate::calibration::CalibrationCoefficients;
use crate::config::PhModel;

/// Slope of the factory line (pH per volt, negative).
pub const FIXED_SLOPE: f32 = -8.85;
/// Intercept of the factory line.
pub const FIXED_INTERCEPT: f32 = 22.2;

pub const BUFFER_LOW: f32 = 6.86;
pub const BUFFER_HIGH: f32 = 9.18;

/// Factory line, independent of stored calibration.
pub fn fixed_ph(voltage: f32) -> f32 {
    FIXED_SLOPE * voltage + FIXED_INTERCEPT
}

/// Line through the two buffer calibration points.
///
/// Returns `None` when both points share a voltage, which would make the
/// slope infinite.
pub fn two_point_ph(voltage: f32, v_686: f32, v_918: f32) -> Option<f32> {
    let span = v_686 - v_918;
    if span.abs() < f32::EPSILON {
        return None;
    }
    let m = (BUFFER_HIGH - BUFFER_LOW) / span;
    let b = BUFFER_LOW + m * v_686;
    Some(-m * voltage + b)
}

/// pH under the configured model.  A degenerate two-point calibration
/// falls back to the factory line.
pub fn ph_value(voltage: f32, model: PhModel, coefficients: &CalibrationCoefficients) -> f32 {
    match model {
        PhModel::Fixed => fixed_ph(voltage),
        PhModel::TwoPoint => two_point_ph(
            voltage,
            coefficients.ph_voltage_at_6_86,
            coefficients.ph_voltage_at_9_18,
        )
        .unwrap_or_else(|| {
            log::warn!("pH: calibration points coincide, using factory line");
            fixed_ph(voltage)
        }),
    }
}
