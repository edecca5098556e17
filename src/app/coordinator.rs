//! Sampling coordinator: the periodic task that turns converter readings
//! into published quantities.
//!
//! ```text
//!            due epoch or send_data
//!   Idle ───────────────────────────▶ Sampling ──▶ Publishing ──▶ Idle
//!                                        │
//!                                        └──▶ AcquisitionFailed ──▶ Idle
//! ```
//!
//! A cycle is due when the local wall clock has entered an epoch
//! (`wall_secs / sample_interval_secs`, so the hour of day under the
//! default interval) that has not been published yet,
//! or when a `send_data` command is latched.  An unsynchronised clock
//! never makes a cycle due on its own.
//!
//! Each tick also forwards latched calibration requests to the worker
//! queue.  A full queue leaves the request latched for the next tick.

use std::sync::Arc;
use std::time::Duration;

use embassy_sync::channel::TrySendError;
use log::{debug, info, warn};

use crate::app::commands::{CommandKind, CommandMailbox};
use crate::app::events::{AppEvent, SkipReason};
use crate::app::ports::{Clock, EventSink, LocalTime, Publisher, TemperatureProbe};
use crate::app::telemetry::{Quantity, TopicSet, render_reading};
use crate::calibration::SharedCoefficients;
use crate::calibration::runner::CalibrationQueue;
use crate::config::{PhModel, SystemConfig};
use crate::converter::{ConverterArbiter, ConverterHal};
use crate::error::ConverterError;
use crate::sensors::temperature::FALLBACK_CELSIUS;
use crate::sensors::{SensorChannel, ph, tds, turbidity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Sampling,
    Publishing,
    AcquisitionFailed,
}

/// One cycle's derived quantities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub turbidity_percent: f32,
    pub tds_ppm: f32,
    pub ph: f32,
    /// `None` when the probe could not be read; TDS then used 25 °C.
    pub temperature_c: Option<f32>,
}

impl Readings {
    pub fn value(&self, quantity: Quantity) -> Option<f32> {
        match quantity {
            Quantity::Turbidity => Some(self.turbidity_percent),
            Quantity::Tds => Some(self.tds_ppm),
            Quantity::Ph => Some(self.ph),
            Quantity::Temperature => self.temperature_c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing due.
    Idle,
    /// A cycle was due but produced nothing.
    Skipped(SkipReason),
    /// Readings were handed to the publisher.
    Published(Readings),
}

/// Raw converter results gathered under one lease.
struct Acquisition {
    turbidity_raw: f32,
    tds_volts: f32,
    ph_volts: f32,
}

pub struct SamplingCoordinator<H: ConverterHal> {
    arbiter: Arc<ConverterArbiter<H>>,
    coefficients: Arc<SharedCoefficients>,
    mailbox: Arc<CommandMailbox>,
    calibration_queue: Arc<CalibrationQueue>,
    topics: TopicSet,

    state: CycleState,
    last_epoch: Option<i64>,

    sample_interval_secs: i64,
    tick_interval: Duration,
    lock_timeout: Duration,
    samples: u16,
    ph_model: PhModel,
}

impl<H: ConverterHal> SamplingCoordinator<H> {
    pub fn new(
        arbiter: Arc<ConverterArbiter<H>>,
        coefficients: Arc<SharedCoefficients>,
        mailbox: Arc<CommandMailbox>,
        calibration_queue: Arc<CalibrationQueue>,
        topics: TopicSet,
        config: &SystemConfig,
    ) -> Self {
        Self {
            arbiter,
            coefficients,
            mailbox,
            calibration_queue,
            topics,
            state: CycleState::Idle,
            last_epoch: None,
            sample_interval_secs: i64::from(config.sample_interval_secs.max(1)),
            tick_interval: Duration::from_millis(u64::from(config.tick_interval_ms)),
            lock_timeout: Duration::from_millis(u64::from(config.sampling_lock_timeout_ms)),
            samples: config.samples_per_reading,
            ph_model: config.ph_model,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Most recent epoch with a completed publish set.
    pub fn last_epoch(&self) -> Option<i64> {
        self.last_epoch
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn announce(&self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started {
            sample_interval_secs: self.sample_interval_secs as u32,
        });
    }

    /// One coordinator step.
    pub fn tick(
        &mut self,
        clock: &impl Clock,
        probe: &mut impl TemperatureProbe,
        publisher: &mut impl Publisher,
        sink: &mut impl EventSink,
    ) -> TickOutcome {
        self.dispatch_calibration(sink);

        let now = clock.local_time();
        let epoch = now.map(|t| t.wall_secs().div_euclid(self.sample_interval_secs));
        let send_data = self.mailbox.is_latched(CommandKind::SendData);
        let due = epoch.is_some_and(|e| self.last_epoch != Some(e));
        if !due && !send_data {
            return TickOutcome::Idle;
        }

        self.transition(CycleState::Sampling, sink);
        let acquisition = match self.acquire_readings() {
            Ok(a) => a,
            Err(e) => {
                let reason = match e {
                    ConverterError::Busy => SkipReason::ConverterBusy,
                    other => SkipReason::Converter(other),
                };
                warn!("coordinator: cycle skipped ({})", e);
                self.transition(CycleState::AcquisitionFailed, sink);
                sink.emit(&AppEvent::CycleSkipped(reason));
                self.transition(CycleState::Idle, sink);
                return TickOutcome::Skipped(reason);
            }
        };

        // The probe has its own bus; read it with the converter released.
        let temperature_c = match probe.measure_celsius() {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("coordinator: temperature unavailable ({}), compensating at 25 °C", e);
                None
            }
        };
        let readings = self.derive(&acquisition, temperature_c);

        self.transition(CycleState::Publishing, sink);
        // Forced cycles before SNTP sync still go out, stamped at the Unix origin.
        let timestamp = now.unwrap_or_else(|| LocalTime::from_epoch_utc(0)).iso8601();
        for quantity in Quantity::ALL {
            let Some(value) = readings.value(quantity) else {
                continue;
            };
            self.publish_reading(quantity, value, &timestamp, publisher, sink);
        }

        if send_data {
            self.mailbox.clear(CommandKind::SendData);
            sink.emit(&AppEvent::CommandHandled(CommandKind::SendData));
        }
        if let Some(e) = epoch {
            self.last_epoch = Some(e);
        }
        self.transition(CycleState::Idle, sink);
        TickOutcome::Published(readings)
    }

    fn acquire_readings(&self) -> Result<Acquisition, ConverterError> {
        let mut lease = self.arbiter.acquire(self.lock_timeout)?;
        let acquisition = Acquisition {
            turbidity_raw: lease.average_raw(SensorChannel::Turbidity, self.samples)?,
            tds_volts: lease.average_voltage(SensorChannel::Tds, self.samples)?,
            ph_volts: lease.average_voltage(SensorChannel::Ph, self.samples)?,
        };
        self.arbiter.release(lease);
        Ok(acquisition)
    }

    fn derive(&self, a: &Acquisition, temperature_c: Option<f32>) -> Readings {
        let coefficients = self.coefficients.snapshot();
        let compensation_c = temperature_c.unwrap_or(FALLBACK_CELSIUS);
        Readings {
            turbidity_percent: turbidity::turbidity_percent(a.turbidity_raw),
            tds_ppm: tds::tds_ppm(a.tds_volts, compensation_c, coefficients.tds_correction_factor),
            ph: ph::ph_value(a.ph_volts, self.ph_model, &coefficients),
            temperature_c,
        }
    }

    fn publish_reading(
        &self,
        quantity: Quantity,
        value: f32,
        timestamp: &str,
        publisher: &mut impl Publisher,
        sink: &mut impl EventSink,
    ) {
        let payload = match render_reading(quantity, value, timestamp) {
            Ok(p) => p,
            Err(e) => {
                warn!("coordinator: cannot encode {}: {}", quantity.name(), e);
                return;
            }
        };
        let topic = self.topics.reading(quantity);
        match publisher.publish(&topic, &payload) {
            Ok(()) => sink.emit(&AppEvent::ReadingPublished { quantity, value }),
            Err(e) => warn!("coordinator: {} not published: {}", quantity.name(), e),
        }
    }

    /// Move latched calibration requests onto the worker queue.
    fn dispatch_calibration(&self, sink: &mut impl EventSink) {
        while let Some(job) = self.mailbox.take_calibration() {
            match self.calibration_queue.try_send(job) {
                Ok(()) => {
                    info!("coordinator: queued {:?}", job);
                    sink.emit(&AppEvent::CalibrationQueued(job));
                }
                Err(TrySendError::Full(job)) => {
                    debug!("coordinator: calibration queue full, retrying next tick");
                    self.mailbox.restore_calibration(job);
                    break;
                }
            }
        }
    }

    fn transition(&mut self, to: CycleState, sink: &mut impl EventSink) {
        let from = self.state;
        if from != to {
            self.state = to;
            sink.emit(&AppEvent::CycleStateChanged { from, to });
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::app::commands::Command;
    use crate::app::ports::PublishError;
    use crate::app::telemetry::DeviceId;
    use crate::calibration::runner::CalibrationJob;
    use crate::drivers::adc::SimConverter;
    use crate::error::SensorError;
    use crate::sensors::temperature::SimTemperatureProbe;

    /// 2025-03-01T10:00:00Z
    const T0: i64 = 1_740_823_200;

    /// UTC epoch plus a fixed zone offset in seconds.
    struct TestClock(Cell<Option<i64>>, i64);
    impl Clock for TestClock {
        fn local_time(&self) -> Option<LocalTime> {
            self.0
                .get()
                .map(|e| LocalTime::from_epoch_with_offset(e, self.1))
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Vec<(String, String)>,
        offline: bool,
    }
    impl Publisher for Outbox {
        fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
            if self.offline {
                return Err(PublishError::NotConnected);
            }
            self.sent.push((topic.into(), payload.into()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Events(Vec<AppEvent>);
    impl EventSink for Events {
        fn emit(&mut self, event: &AppEvent) {
            self.0.push(event.clone());
        }
    }

    struct Rig {
        coordinator: SamplingCoordinator<SimConverter>,
        arbiter: Arc<ConverterArbiter<SimConverter>>,
        mailbox: Arc<CommandMailbox>,
        queue: Arc<CalibrationQueue>,
        clock: TestClock,
        probe: SimTemperatureProbe,
        outbox: Outbox,
        events: Events,
    }

    impl Rig {
        fn new() -> Self {
            let mut hal = SimConverter::new();
            hal.set_raw(SensorChannel::Turbidity, 1150);
            hal.set_raw(SensorChannel::Tds, SimConverter::raw_for_volts(0.5));
            hal.set_raw(SensorChannel::Ph, SimConverter::raw_for_volts(1.7));
            let config = SystemConfig {
                sampling_lock_timeout_ms: 20,
                samples_per_reading: 3,
                ..Default::default()
            };
            let arbiter = Arc::new(ConverterArbiter::from_config(hal, &config));
            let mailbox = Arc::new(CommandMailbox::new());
            let queue = Arc::new(CalibrationQueue::new());
            let mut id = DeviceId::new();
            id.push_str("AA:BB:CC:DD:EE:FF").unwrap();
            let coordinator = SamplingCoordinator::new(
                Arc::clone(&arbiter),
                Arc::new(SharedCoefficients::default()),
                Arc::clone(&mailbox),
                Arc::clone(&queue),
                TopicSet::new(id),
                &config,
            );
            Self {
                coordinator,
                arbiter,
                mailbox,
                queue,
                clock: TestClock(Cell::new(Some(T0)), 0),
                probe: SimTemperatureProbe::new(21.5),
                outbox: Outbox::default(),
                events: Events::default(),
            }
        }

        fn tick(&mut self) -> TickOutcome {
            self.coordinator.tick(
                &self.clock,
                &mut self.probe,
                &mut self.outbox,
                &mut self.events,
            )
        }
    }

    #[test]
    fn one_publish_set_per_epoch() {
        let mut rig = Rig::new();
        assert!(matches!(rig.tick(), TickOutcome::Published(_)));
        assert_eq!(rig.outbox.sent.len(), 4);

        rig.clock.0.set(Some(T0 + 1800));
        assert_eq!(rig.tick(), TickOutcome::Idle);
        assert_eq!(rig.outbox.sent.len(), 4);

        rig.clock.0.set(Some(T0 + 3600));
        assert!(matches!(rig.tick(), TickOutcome::Published(_)));
        assert_eq!(rig.outbox.sent.len(), 8);
        assert_eq!(rig.coordinator.last_epoch(), Some((T0 + 3600) / 3600));
    }

    #[test]
    fn epoch_follows_local_hour_under_half_hour_offset() {
        const IST: i64 = 5 * 3600 + 1800;
        let mut rig = Rig::new();
        // 04:30Z is 10:00 local.
        rig.clock = TestClock(Cell::new(Some(T0 - IST)), IST);
        assert!(matches!(rig.tick(), TickOutcome::Published(_)));
        assert_eq!(rig.outbox.sent[0].1, r#"{"timestamp":"2025-03-01T10:00:00","turbidity":50}"#);

        // 05:00Z is 10:30 local, still the same local hour.
        rig.clock.0.set(Some(T0 - IST + 1800));
        assert_eq!(rig.tick(), TickOutcome::Idle);

        rig.clock.0.set(Some(T0 - IST + 3600));
        assert!(matches!(rig.tick(), TickOutcome::Published(_)));
        assert_eq!(rig.outbox.sent.len(), 8);
        assert_eq!(rig.coordinator.last_epoch(), Some(T0 / 3600 + 1));
    }

    #[test]
    fn publishes_each_quantity_in_order() {
        let mut rig = Rig::new();
        let TickOutcome::Published(r) = rig.tick() else {
            panic!("expected a cycle");
        };
        assert_eq!(r.turbidity_percent, 50.0);
        assert_eq!(r.temperature_c, Some(21.5));

        let topics: Vec<&str> = rig.outbox.sent.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            topics,
            [
                "sensors/AA:BB:CC:DD:EE:FF/turbidity",
                "sensors/AA:BB:CC:DD:EE:FF/tds",
                "sensors/AA:BB:CC:DD:EE:FF/ph",
                "sensors/AA:BB:CC:DD:EE:FF/temperature",
            ]
        );
        assert_eq!(
            rig.outbox.sent[0].1,
            r#"{"timestamp":"2025-03-01T10:00:00","turbidity":50}"#
        );
        assert_eq!(rig.coordinator.state(), CycleState::Idle);
    }

    #[test]
    fn converter_released_after_cycle() {
        let mut rig = Rig::new();
        rig.tick();
        let (powered, enabled) = rig
            .arbiter
            .inspect(|h| (h.is_powered(), h.enabled_mask()))
            .unwrap();
        assert!(!powered);
        assert_eq!(enabled, 0);
    }

    #[test]
    fn unsynced_clock_waits_for_send_data() {
        let mut rig = Rig::new();
        rig.clock.0.set(None);
        assert_eq!(rig.tick(), TickOutcome::Idle);

        rig.mailbox.latch(Command::SendData);
        assert!(matches!(rig.tick(), TickOutcome::Published(_)));
        assert!(rig.outbox.sent[0].1.contains("1970-01-01T00:00:00"));
        assert!(!rig.mailbox.is_latched(CommandKind::SendData));
        assert_eq!(rig.coordinator.last_epoch(), None);
    }

    #[test]
    fn send_data_forces_cycle_within_sampled_epoch() {
        let mut rig = Rig::new();
        rig.tick();
        rig.mailbox.latch(Command::SendData);
        assert!(matches!(rig.tick(), TickOutcome::Published(_)));
        assert_eq!(rig.outbox.sent.len(), 8);
        assert!(rig.events.0.contains(&AppEvent::CommandHandled(CommandKind::SendData)));
        assert_eq!(rig.tick(), TickOutcome::Idle);
    }

    #[test]
    fn busy_converter_leaves_epoch_unsampled() {
        let mut rig = Rig::new();
        rig.mailbox.latch(Command::SendData);
        let arbiter = Arc::clone(&rig.arbiter);
        let held = arbiter.acquire(Duration::ZERO).unwrap();

        assert_eq!(rig.tick(), TickOutcome::Skipped(SkipReason::ConverterBusy));
        assert!(rig.outbox.sent.is_empty());
        assert_eq!(rig.coordinator.last_epoch(), None);
        assert!(rig.mailbox.is_latched(CommandKind::SendData));
        assert!(rig.events.0.contains(&AppEvent::CycleStateChanged {
            from: CycleState::Sampling,
            to: CycleState::AcquisitionFailed,
        }));
        assert_eq!(rig.coordinator.state(), CycleState::Idle);

        drop(held);
        assert!(matches!(rig.tick(), TickOutcome::Published(_)));
        assert!(!rig.mailbox.is_latched(CommandKind::SendData));
    }

    #[test]
    fn probe_failure_skips_temperature_and_compensates_at_25() {
        let mut rig = Rig::new();
        rig.probe.set_failure(SensorError::NoDevice);
        let TickOutcome::Published(r) = rig.tick() else {
            panic!("expected a cycle");
        };
        assert_eq!(r.temperature_c, None);
        assert_eq!(rig.outbox.sent.len(), 3);

        let expected = tds::tds_ppm(0.5, 25.0, crate::calibration::DEFAULT_TDS_CORRECTION_FACTOR);
        assert!((r.tds_ppm - expected).abs() < 2.0);
    }

    #[test]
    fn publish_failure_still_marks_epoch() {
        let mut rig = Rig::new();
        rig.outbox.offline = true;
        assert!(matches!(rig.tick(), TickOutcome::Published(_)));
        assert!(
            !rig.events
                .0
                .iter()
                .any(|e| matches!(e, AppEvent::ReadingPublished { .. }))
        );
        assert_eq!(rig.coordinator.last_epoch(), Some(T0 / 3600));
    }

    #[test]
    fn calibration_dispatch_backs_off_when_queue_full() {
        let mut rig = Rig::new();
        rig.queue.try_send(CalibrationJob::Tds { reference: 500.0 }).unwrap();
        rig.queue.try_send(CalibrationJob::Tds { reference: 600.0 }).unwrap();

        rig.mailbox.latch(Command::PhCalibration(9.18));
        rig.tick();
        assert_eq!(rig.mailbox.poll().ph_calibration, Some(9.18));

        rig.queue.try_receive().unwrap();
        rig.tick();
        assert_eq!(rig.mailbox.poll().ph_calibration, None);
        assert!(rig.events.0.contains(&AppEvent::CalibrationQueued(CalibrationJob::Ph {
            reference: 9.18
        })));
    }
}
