//! Calibration end to end: inbound MQTT message → mailbox latch →
//! coordinator dispatch → worker run → persisted coefficient → next cycle.

use std::sync::Arc;
use std::time::Duration;

use aquasense::app::coordinator::TickOutcome;
use aquasense::app::events::AppEvent;
use aquasense::calibration::CalibrationCoefficients;
use aquasense::calibration::runner::CalibrationJob;
use aquasense::calibration::store::NAMESPACE;
use aquasense::config::{PhModel, SystemConfig};
use aquasense::drivers::adc::SimConverter;
use aquasense::sensors::{SensorChannel, tds};

use crate::mock_hw::{Device, MockNvs, default_hal, test_config};

fn set_volts(dev: &Device, channel: SensorChannel, volts: f32) {
    dev.with_hal(|h| h.set_raw(channel, SimConverter::raw_for_volts(volts)));
}

#[test]
fn ph_calibration_is_persisted_and_survives_reboot() {
    let mut dev = Device::new();
    set_volts(&dev, SensorChannel::Ph, 1.5);

    dev.receive("ph_calibration", "9.18");
    dev.tick();
    assert!(
        dev.events
            .0
            .contains(&AppEvent::CalibrationQueued(CalibrationJob::Ph { reference: 9.18 }))
    );
    assert_eq!(dev.run_worker(), 1);

    let live = dev.coefficients.snapshot();
    assert!((live.ph_voltage_at_9_18 - 1.5).abs() < 2e-3);
    assert_eq!(
        live.ph_voltage_at_6_86,
        CalibrationCoefficients::default().ph_voltage_at_6_86
    );
    assert_eq!(dev.nvs.raw(NAMESPACE, "calib_9_18").map(|b| b.len()), Some(4));
    assert!(dev.nvs.raw(NAMESPACE, "calib_6_86").is_none());

    let rebooted = Device::boot(test_config(), default_hal(), dev.nvs.clone());
    assert_eq!(rebooted.coefficients.snapshot(), live);
}

#[test]
fn two_point_model_follows_fresh_calibration() {
    let config = SystemConfig {
        ph_model: PhModel::TwoPoint,
        ..test_config()
    };
    let mut dev = Device::boot(config, default_hal(), MockNvs::new());

    set_volts(&dev, SensorChannel::Ph, 1.60);
    dev.receive("ph_calibration", "6.86");
    dev.tick();
    dev.run_worker();

    set_volts(&dev, SensorChannel::Ph, 1.30);
    dev.receive("ph_calibration", "9.18");
    dev.tick();
    dev.run_worker();

    set_volts(&dev, SensorChannel::Ph, 1.45);
    dev.receive("send_data", "");
    let TickOutcome::Published(r) = dev.tick() else {
        panic!("send_data must force a cycle");
    };
    assert!((r.ph - 8.02).abs() < 0.02, "pH {}", r.ph);
}

#[test]
fn tds_factor_applies_to_the_next_cycle() {
    let mut dev = Device::new();
    dev.receive("tds_calibration", "500");
    dev.tick();
    assert_eq!(dev.run_worker(), 1);

    let factor = dev.coefficients.snapshot().tds_correction_factor;
    assert!((factor - 500.0).abs() < 1.0, "factor {}", factor);

    dev.receive("send_data", "");
    let TickOutcome::Published(r) = dev.tick() else {
        panic!("send_data must force a cycle");
    };
    let expected = tds::tds_ppm(1.0, 25.0, factor);
    assert!((r.tds_ppm - expected).abs() < 1.0);
}

#[test]
fn only_latest_value_is_dispatched() {
    let mut dev = Device::new();
    dev.receive("ph_calibration", "6.86");
    dev.receive("ph_calibration", "9.18");
    dev.tick();

    let queued: Vec<_> = dev
        .events
        .0
        .iter()
        .filter_map(|e| match e {
            AppEvent::CalibrationQueued(job) => Some(*job),
            _ => None,
        })
        .collect();
    assert_eq!(queued, [CalibrationJob::Ph { reference: 9.18 }]);
}

#[test]
fn full_queue_keeps_request_latched_until_worker_drains() {
    let mut dev = Device::new();
    dev.receive("ph_calibration", "9.18");
    dev.receive("tds_calibration", "500");
    dev.tick();

    dev.receive("ph_calibration", "6.86");
    dev.tick();
    assert!(dev.mailbox.poll().ph_calibration.is_some());

    assert_eq!(dev.run_worker(), 2);
    dev.tick();
    assert!(dev.mailbox.poll().is_empty());
    assert_eq!(dev.run_worker(), 1);
}

#[test]
fn busy_converter_aborts_calibration_without_side_effects() {
    let mut dev = Device::new();
    dev.receive("tds_calibration", "500");
    dev.tick();

    let arbiter = Arc::clone(&dev.arbiter);
    let held = arbiter.acquire(Duration::ZERO).unwrap();
    assert_eq!(dev.run_worker(), 1);
    drop(held);

    assert_eq!(dev.coefficients.snapshot(), CalibrationCoefficients::default());
    assert!(dev.nvs.raw(NAMESPACE, "calib_tds").is_none());
    assert_eq!(
        dev.events.count(|e| matches!(e, AppEvent::CalibrationApplied(_))),
        0
    );
}

#[test]
fn corrupt_stored_coefficient_falls_back_to_default() {
    use aquasense::app::ports::StoragePort;

    let mut nvs = MockNvs::new();
    nvs.write(NAMESPACE, "calib_tds", &[1, 2, 3]).unwrap();
    nvs.write(NAMESPACE, "calib_9_18", &1.4f32.to_le_bytes()).unwrap();

    let dev = Device::boot(test_config(), default_hal(), nvs);
    let c = dev.coefficients.snapshot();
    assert_eq!(
        c.tds_correction_factor,
        CalibrationCoefficients::default().tds_correction_factor
    );
    assert_eq!(c.ph_voltage_at_9_18, 1.4);
}
