//! Persisted calibration coefficients.
//!
//! Each coefficient is an independent 4-byte little-endian `f32` blob in
//! the `calibration` namespace, so a corrupt or missing key only resets
//! that one field to its default.

use log::{info, warn};

use super::{CalibrationCoefficients, CoefficientField};
use crate::app::ports::{StorageError, StoragePort};

pub const NAMESPACE: &str = "calibration";

pub struct CalibrationStore<S: StoragePort> {
    storage: S,
}

impl<S: StoragePort> CalibrationStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load every field, falling back to its default when the key is
    /// missing, has the wrong size, holds a non-finite value, or the
    /// backend fails.
    pub fn load(&self) -> CalibrationCoefficients {
        let mut coefficients = CalibrationCoefficients::default();
        for field in CoefficientField::ALL {
            match self.read_field(field) {
                Ok(value) => field.set(&mut coefficients, value),
                Err(StorageError::NotFound) => {
                    info!("calibration: {} not stored, using default", field.key());
                }
                Err(e) => {
                    warn!("calibration: {} unreadable ({}), using default", field.key(), e);
                }
            }
        }
        info!(
            "calibration: pH 6.86={:.3}V 9.18={:.3}V, TDS factor={:.3}",
            coefficients.ph_voltage_at_6_86,
            coefficients.ph_voltage_at_9_18,
            coefficients.tds_correction_factor
        );
        coefficients
    }

    pub fn read_field(&self, field: CoefficientField) -> Result<f32, StorageError> {
        // Oversized so that a longer blob is detected rather than truncated.
        let mut buf = [0u8; 8];
        let len = self.storage.read(NAMESPACE, field.key(), &mut buf)?;
        if len != 4 {
            return Err(StorageError::Corrupt);
        }
        let value = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if !value.is_finite() {
            return Err(StorageError::Corrupt);
        }
        Ok(value)
    }

    /// Commit one coefficient.  Atomic per key.
    pub fn save(&mut self, field: CoefficientField, value: f32) -> Result<(), StorageError> {
        if !value.is_finite() {
            return Err(StorageError::Corrupt);
        }
        self.storage
            .write(NAMESPACE, field.key(), &value.to_le_bytes())?;
        info!("calibration: saved {}={:.4}", field.key(), value);
        Ok(())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}
