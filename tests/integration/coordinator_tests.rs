//! Sampling cycle tests against the simulated converter, probe, clock and
//! publisher.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use aquasense::app::coordinator::{CycleState, TickOutcome};
use aquasense::app::events::{AppEvent, SkipReason};
use aquasense::app::telemetry::Quantity;
use aquasense::error::{ConverterError, SensorError};
use aquasense::pins;
use aquasense::sensors::tds;

use crate::mock_hw::{DEVICE, Device, MockNvs, T0, default_hal, test_config};

fn published_readings(outcome: TickOutcome) -> aquasense::app::coordinator::Readings {
    match outcome {
        TickOutcome::Published(r) => r,
        other => panic!("expected a publish set, got {:?}", other),
    }
}

#[test]
fn first_tick_publishes_every_quantity() {
    let mut dev = Device::new();
    let r = published_readings(dev.tick());

    assert_eq!(r.turbidity_percent, 50.0);
    assert_eq!(r.temperature_c, Some(25.0));
    assert!((r.ph - 6.845).abs() < 0.01, "pH {}", r.ph);

    let topics: Vec<_> = dev.publisher.sent.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        topics,
        [
            format!("sensors/{}/turbidity", DEVICE),
            format!("sensors/{}/tds", DEVICE),
            format!("sensors/{}/ph", DEVICE),
            format!("sensors/{}/temperature", DEVICE),
        ]
    );
    assert_eq!(
        dev.published("turbidity"),
        [r#"{"timestamp":"2025-03-01T10:00:00","turbidity":50}"#]
    );
    assert_eq!(
        dev.published("temperature"),
        [r#"{"timestamp":"2025-03-01T10:00:00","temperature":25.0}"#]
    );
    assert_eq!(dev.coordinator.state(), CycleState::Idle);
}

#[test]
fn one_publish_set_per_hour_over_a_day() {
    let mut dev = Device::new();
    for _ in 0..(24 * 6) {
        dev.tick();
        dev.clock.advance(600);
    }
    assert_eq!(dev.published("turbidity").len(), 24);
    assert_eq!(dev.published("ph").len(), 24);
    assert_eq!(
        dev.events
            .count(|e| matches!(e, AppEvent::ReadingPublished { quantity: Quantity::Tds, .. })),
        24
    );
}

#[test]
fn mid_epoch_boot_samples_immediately_then_waits_for_boundary() {
    let mut dev = Device::new();
    dev.clock.set(T0 + 1800);
    assert!(matches!(dev.tick(), TickOutcome::Published(_)));

    dev.clock.advance(1799);
    assert_eq!(dev.tick(), TickOutcome::Idle);

    dev.clock.advance(1);
    assert!(matches!(dev.tick(), TickOutcome::Published(_)));
    assert_eq!(dev.published("ph").len(), 2);
}

#[test]
fn sensor_supplies_are_off_between_cycles() {
    let mut dev = Device::new();
    dev.tick();

    let (enabled, ever, powered, live) = dev.with_hal(|h| {
        (
            h.enabled_mask(),
            h.pins_ever_enabled(),
            h.is_powered(),
            h.outstanding_calibrations(),
        )
    });
    assert_eq!(enabled, 0);
    assert_eq!(
        ever,
        (1 << pins::TDS_ENABLE_GPIO) | (1 << pins::PH_ENABLE_GPIO) | (1 << pins::TURBIDITY_ENABLE_GPIO)
    );
    assert!(!powered);
    assert_eq!(live, 0);
}

#[test]
fn probe_failure_drops_temperature_and_compensates_at_25c() {
    let mut reference = Device::new();
    let expected = published_readings(reference.tick());

    let mut dev = Device::new();
    dev.probe.set_failure(SensorError::NoDevice);
    let r = published_readings(dev.tick());

    assert_eq!(r.temperature_c, None);
    assert_eq!(r.tds_ppm, expected.tds_ppm);
    assert!(dev.published("temperature").is_empty());
    assert_eq!(dev.published("tds").len(), 1);
}

#[test]
fn warm_water_reads_lower_tds() {
    let mut dev = Device::new();
    dev.probe.set_celsius(30.0);
    let r = published_readings(dev.tick());

    let at_reference = tds::tds_ppm(1.0, 25.0, dev.coefficients.snapshot().tds_correction_factor);
    assert!(r.tds_ppm < at_reference);
    assert_eq!(r.temperature_c, Some(30.0));
}

#[test]
fn held_converter_skips_cycle_and_epoch_is_retried() {
    let mut dev = Device::new();
    let arbiter = Arc::clone(&dev.arbiter);
    let held = arbiter.acquire(Duration::ZERO).unwrap();

    assert_eq!(dev.tick(), TickOutcome::Skipped(SkipReason::ConverterBusy));
    assert!(dev.publisher.sent.is_empty());
    assert_eq!(dev.coordinator.last_epoch(), None);
    assert!(dev.events.0.contains(&AppEvent::CycleStateChanged {
        from: CycleState::Sampling,
        to: CycleState::AcquisitionFailed,
    }));

    drop(held);
    assert!(matches!(dev.tick(), TickOutcome::Published(_)));
    assert_eq!(dev.coordinator.last_epoch(), Some(T0 / 3600));
}

#[test]
fn waits_for_short_lease_held_by_another_task() {
    let config = aquasense::config::SystemConfig {
        sampling_lock_timeout_ms: 2000,
        ..test_config()
    };
    let mut dev = Device::boot(config, default_hal(), MockNvs::new());

    let arbiter = Arc::clone(&dev.arbiter);
    let acquired = Arc::new(Barrier::new(2));
    let signal = Arc::clone(&acquired);
    let worker = std::thread::spawn(move || {
        let lease = arbiter.acquire(Duration::ZERO).unwrap();
        signal.wait();
        std::thread::sleep(Duration::from_millis(20));
        drop(lease);
    });

    acquired.wait();
    assert!(matches!(dev.tick(), TickOutcome::Published(_)));
    worker.join().unwrap();
}

#[test]
fn failed_conversion_reports_reason_and_powers_down() {
    let mut hal = default_hal();
    hal.fail_reads = true;
    let mut dev = Device::boot(test_config(), hal, MockNvs::new());

    assert_eq!(
        dev.tick(),
        TickOutcome::Skipped(SkipReason::Converter(ConverterError::ReadFailed(-1)))
    );
    let (enabled, powered) = dev.with_hal(|h| (h.enabled_mask(), h.is_powered()));
    assert_eq!(enabled, 0);
    assert!(!powered);
}

#[test]
fn missing_calibration_scheme_uses_nominal_scale() {
    let mut hal = default_hal();
    hal.calibration_available = false;
    let mut dev = Device::boot(test_config(), hal, MockNvs::new());

    let r = published_readings(dev.tick());
    assert_eq!(r.turbidity_percent, 50.0);
    assert!(r.ph.is_finite());
    assert_eq!(dev.with_hal(|h| h.calibrations_created), 0);
}

#[test]
fn offline_broker_does_not_repeat_the_epoch() {
    let mut dev = Device::new();
    dev.publisher.connected = false;

    assert!(matches!(dev.tick(), TickOutcome::Published(_)));
    assert!(dev.publisher.sent.is_empty());

    dev.publisher.connected = true;
    assert_eq!(dev.tick(), TickOutcome::Idle);
}

#[test]
fn unsynced_clock_publishes_only_on_request() {
    let mut dev = Device::new();
    dev.clock.set(0);
    assert_eq!(dev.tick(), TickOutcome::Idle);

    dev.receive("send_data", "");
    assert!(matches!(dev.tick(), TickOutcome::Published(_)));
    assert_eq!(
        dev.published("turbidity"),
        [r#"{"timestamp":"1970-01-01T00:00:00","turbidity":50}"#]
    );
    assert_eq!(dev.coordinator.last_epoch(), None);
}
