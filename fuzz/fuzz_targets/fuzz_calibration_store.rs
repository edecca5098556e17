//! Fuzz target: `CalibrationStore::load`
//!
//! Writes arbitrary blobs under every coefficient key and checks that
//! loading never panics and never yields a non-finite coefficient.
//!
//! cargo fuzz run fuzz_calibration_store

#![no_main]

use aquasense::adapters::nvs::NvsAdapter;
use aquasense::app::ports::StoragePort;
use aquasense::calibration::CoefficientField;
use aquasense::calibration::store::{CalibrationStore, NAMESPACE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut nvs) = NvsAdapter::new() else {
        return;
    };
    for (field, chunk) in CoefficientField::ALL.iter().zip(data.chunks(6)) {
        let _ = nvs.write(NAMESPACE, field.key(), chunk);
    }

    let coefficients = CalibrationStore::new(nvs).load();
    for field in CoefficientField::ALL {
        assert!(field.get(&coefficients).is_finite(), "{} not finite", field.key());
    }
});
