//! Mock adapters for integration tests.
//!
//! `MockNvs` shares its map between clones so a test can "reboot" by
//! building a fresh store over the same flash contents.  `Device` wires the
//! full sampling stack against the simulated converter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aquasense::adapters::log_sink::LogPublisher;
use aquasense::adapters::time::SimClock;
use aquasense::app::commands::{CommandMailbox, CommandRouter};
use aquasense::app::coordinator::{SamplingCoordinator, TickOutcome};
use aquasense::app::events::AppEvent;
use aquasense::app::ports::{EventSink, StorageError, StoragePort};
use aquasense::app::telemetry::{DeviceId, TopicSet};
use aquasense::calibration::SharedCoefficients;
use aquasense::calibration::runner::{CalibrationQueue, CalibrationRunner};
use aquasense::calibration::store::CalibrationStore;
use aquasense::config::SystemConfig;
use aquasense::converter::ConverterArbiter;
use aquasense::drivers::adc::SimConverter;
use aquasense::sensors::SensorChannel;
use aquasense::sensors::temperature::SimTemperatureProbe;

pub const DEVICE: &str = "AA:BB:CC:DD:EE:FF";

/// 2025-03-01T10:00:00Z
pub const T0: i64 = 1_740_823_200;

// ── MockNvs ───────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockNvs {
    store: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.store.lock().unwrap().get(&format!("{}::{}", namespace, key)).cloned()
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let k = format!("{}::{}", namespace, key);
        match self.store.lock().unwrap().get(&k) {
            Some(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                Ok(n)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let k = format!("{}::{}", namespace, key);
        self.store.lock().unwrap().insert(k, data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.lock().unwrap().remove(&format!("{}::{}", namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.lock().unwrap().contains_key(&format!("{}::{}", namespace, key))
    }
}

// ── Event recorder ────────────────────────────────────────────

#[derive(Default)]
pub struct EventLog(pub Vec<AppEvent>);

#[allow(dead_code)]
impl EventLog {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.0.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &AppEvent) {
        self.0.push(event.clone());
    }
}

// ── Device rig ────────────────────────────────────────────────

pub fn device_id() -> DeviceId {
    let mut id = DeviceId::new();
    let _ = id.push_str(DEVICE);
    id
}

pub fn test_config() -> SystemConfig {
    SystemConfig {
        sampling_lock_timeout_ms: 30,
        calibration_lock_timeout_ms: 60,
        ..Default::default()
    }
}

/// Simulated converter reading 50 % turbidity, 1.0 V TDS and 1.735 V pH.
pub fn default_hal() -> SimConverter {
    let mut hal = SimConverter::new();
    hal.set_raw(SensorChannel::Turbidity, 1150);
    hal.set_raw(SensorChannel::Tds, SimConverter::raw_for_volts(1.0));
    hal.set_raw(SensorChannel::Ph, SimConverter::raw_for_volts(1.735));
    hal
}

/// Everything `main()` builds, minus the network.
pub struct Device {
    pub config: SystemConfig,
    pub nvs: MockNvs,
    pub arbiter: Arc<ConverterArbiter<SimConverter>>,
    pub coefficients: Arc<SharedCoefficients>,
    pub mailbox: Arc<CommandMailbox>,
    pub queue: Arc<CalibrationQueue>,
    pub router: CommandRouter,
    pub coordinator: SamplingCoordinator<SimConverter>,
    pub runner: CalibrationRunner<SimConverter, MockNvs>,
    pub clock: SimClock,
    pub probe: SimTemperatureProbe,
    pub publisher: LogPublisher,
    pub events: EventLog,
}

#[allow(dead_code)]
impl Device {
    pub fn boot(config: SystemConfig, hal: SimConverter, nvs: MockNvs) -> Self {
        let store = CalibrationStore::new(nvs.clone());
        let coefficients = Arc::new(SharedCoefficients::new(store.load()));
        let arbiter = Arc::new(ConverterArbiter::from_config(hal, &config));
        let mailbox = Arc::new(CommandMailbox::new());
        let queue = Arc::new(CalibrationQueue::new());
        let router = CommandRouter::new(device_id(), Arc::clone(&mailbox));
        let coordinator = SamplingCoordinator::new(
            Arc::clone(&arbiter),
            Arc::clone(&coefficients),
            Arc::clone(&mailbox),
            Arc::clone(&queue),
            TopicSet::new(device_id()),
            &config,
        );
        let runner = CalibrationRunner::new(
            Arc::clone(&arbiter),
            Arc::clone(&coefficients),
            store,
            &config,
        );
        Self {
            config,
            nvs,
            arbiter,
            coefficients,
            mailbox,
            queue,
            router,
            coordinator,
            runner,
            clock: SimClock::new(T0),
            probe: SimTemperatureProbe::new(25.0),
            publisher: LogPublisher::new(),
            events: EventLog::default(),
        }
    }

    pub fn new() -> Self {
        Self::boot(test_config(), default_hal(), MockNvs::new())
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.coordinator.tick(
            &self.clock,
            &mut self.probe,
            &mut self.publisher,
            &mut self.events,
        )
    }

    /// Deliver an MQTT message for this device.
    pub fn receive(&mut self, suffix: &str, payload: &str) {
        let topic = format!("devices/{}/{}", DEVICE, suffix);
        let _ = self
            .router
            .handle_message(&topic, payload.as_bytes(), &mut self.events);
    }

    /// Run every calibration job the coordinator queued.
    pub fn run_worker(&mut self) -> usize {
        self.runner.run_pending(&self.queue, &mut self.events)
    }

    pub fn published(&self, quantity: &str) -> Vec<&str> {
        let topic = format!("sensors/{}/{}", DEVICE, quantity);
        self.publisher
            .sent
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, p)| p.as_str())
            .collect()
    }

    pub fn with_hal<R>(&self, f: impl FnOnce(&mut SimConverter) -> R) -> R {
        self.arbiter.inspect(f).expect("converter unexpectedly held")
    }
}
