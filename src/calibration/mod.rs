//! Calibration coefficients: the values, their persistence, and the
//! worker that recomputes them from reference solutions.
//!
//! The live coefficients sit in a [`SharedCoefficients`] cell.  Readers
//! take a whole copy; the calibration worker swaps in a new whole value
//! only after the new coefficient has been committed to flash.

pub mod runner;
pub mod store;

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

pub const DEFAULT_PH_VOLTAGE_AT_6_86: f32 = 1.735;
pub const DEFAULT_PH_VOLTAGE_AT_9_18: f32 = 1.473;
pub const DEFAULT_TDS_CORRECTION_FACTOR: f32 = 0.905;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationCoefficients {
    /// Amplifier output in the pH 6.86 buffer (V).
    pub ph_voltage_at_6_86: f32,
    /// Amplifier output in the pH 9.18 buffer (V).
    pub ph_voltage_at_9_18: f32,
    /// Multiplier applied to the TDS cubic.
    pub tds_correction_factor: f32,
}

impl Default for CalibrationCoefficients {
    fn default() -> Self {
        Self {
            ph_voltage_at_6_86: DEFAULT_PH_VOLTAGE_AT_6_86,
            ph_voltage_at_9_18: DEFAULT_PH_VOLTAGE_AT_9_18,
            tds_correction_factor: DEFAULT_TDS_CORRECTION_FACTOR,
        }
    }
}

/// One persisted coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefficientField {
    PhVoltage918,
    PhVoltage686,
    TdsFactor,
}

impl CoefficientField {
    pub const ALL: [Self; 3] = [Self::PhVoltage918, Self::PhVoltage686, Self::TdsFactor];

    /// NVS key (≤ 15 bytes).
    pub const fn key(self) -> &'static str {
        match self {
            Self::PhVoltage918 => "calib_9_18",
            Self::PhVoltage686 => "calib_6_86",
            Self::TdsFactor => "calib_tds",
        }
    }

    pub fn get(self, c: &CalibrationCoefficients) -> f32 {
        match self {
            Self::PhVoltage918 => c.ph_voltage_at_9_18,
            Self::PhVoltage686 => c.ph_voltage_at_6_86,
            Self::TdsFactor => c.tds_correction_factor,
        }
    }

    pub fn set(self, c: &mut CalibrationCoefficients, value: f32) {
        match self {
            Self::PhVoltage918 => c.ph_voltage_at_9_18 = value,
            Self::PhVoltage686 => c.ph_voltage_at_6_86 = value,
            Self::TdsFactor => c.tds_correction_factor = value,
        }
    }
}

/// Lock-guarded snapshot cell shared between the coordinator and the
/// calibration worker.
pub struct SharedCoefficients {
    cell: Mutex<CriticalSectionRawMutex, Cell<CalibrationCoefficients>>,
}

impl SharedCoefficients {
    pub fn new(initial: CalibrationCoefficients) -> Self {
        Self {
            cell: Mutex::new(Cell::new(initial)),
        }
    }

    pub fn snapshot(&self) -> CalibrationCoefficients {
        self.cell.lock(Cell::get)
    }

    /// Swap in a copy with one field changed; returns the new value.
    pub fn update(&self, field: CoefficientField, value: f32) -> CalibrationCoefficients {
        self.cell.lock(|c| {
            let mut next = c.get();
            field.set(&mut next, value);
            c.set(next);
            next
        })
    }
}

impl Default for SharedCoefficients {
    fn default() -> Self {
        Self::new(CalibrationCoefficients::default())
    }
}
