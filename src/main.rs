//! AquaSense Firmware: main entry point
//!
//! Hexagonal architecture: pure sampling and command logic in `app`,
//! hardware and network behind port traits.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspConverter     Ds18b20Probe   NvsAdapter    Esp32Time       │
//! │  (ConverterHal)   (Temperature)  (Config+NVS)  (Clock)         │
//! │  MqttPublisher    HttpFirmwareUpdater   LogEventSink           │
//! │  (Publisher)      (FirmwareUpdater)     (EventSink)            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  SamplingCoordinator · CommandRouter · OtaWatcher      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  CalibrationRunner (core 1) ◄── CalibrationQueue ──┘           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::sntp::EspSntp;
use log::{info, warn};

use aquasense::adapters::log_sink::LogEventSink;
use aquasense::adapters::nvs::NvsAdapter;
use aquasense::adapters::ota::{HttpFirmwareUpdater, check_rollback};
use aquasense::adapters::time::Esp32TimeAdapter;
use aquasense::adapters::wifi::{WifiCredentials, WifiStation};
use aquasense::adapters::{device_id, mqtt};
use aquasense::app::commands::{CommandKind, CommandMailbox, CommandRouter};
use aquasense::app::coordinator::SamplingCoordinator;
use aquasense::app::ota::OtaWatcher;
use aquasense::app::ports::ConfigPort;
use aquasense::app::telemetry::TopicSet;
use aquasense::calibration::runner::{CalibrationQueue, CalibrationRunner};
use aquasense::calibration::store::CalibrationStore;
use aquasense::calibration::SharedCoefficients;
use aquasense::config::SystemConfig;
use aquasense::converter::ConverterArbiter;
use aquasense::drivers::adc::EspConverter;
use aquasense::drivers::task_pin::{Core, spawn_on_core};
use aquasense::drivers::watchdog::{DEFAULT_TIMEOUT_MS, Watchdog};
use aquasense::pins;
use aquasense::sensors::temperature::Ds18b20Probe;

const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  AquaSense v{}                      ║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    check_rollback();

    if let Err(e) = aquasense::drivers::hw_init::init_peripherals() {
        // Sensor supplies in an unknown state; the watchdog resets us.
        log::error!("HAL init failed: {}, halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }

    // ── 2. Config and calibration from NVS ────────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };
    let store = CalibrationStore::new(nvs);
    let coefficients = Arc::new(SharedCoefficients::new(store.load()));

    // ── 3. Shared state ───────────────────────────────────────
    let arbiter = Arc::new(ConverterArbiter::from_config(EspConverter::new(), &config));
    let mailbox = Arc::new(CommandMailbox::new());
    let calibration_queue = Arc::new(CalibrationQueue::new());

    // ── 4. Network and time ───────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let credentials = WifiCredentials::from_build_env().map_err(|e| anyhow::anyhow!("{}", e))?;
    let mut wifi = WifiStation::new(peripherals.modem, sysloop, &credentials)?;
    wifi.connect();

    let _sntp = EspSntp::new_default()?;
    let clock = Esp32TimeAdapter::new(&config.timezone);
    info!("SNTP started, uptime {}s", clock.uptime_secs());

    // ── 5. Identity and MQTT ──────────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&mac);
    let client_id = device_id::client_id(&mac);
    info!("Device ID: {} (client: {})", dev_id, client_id);

    let topics = TopicSet::new(dev_id.clone());
    let router = CommandRouter::new(dev_id, Arc::clone(&mailbox));
    let mut publisher = mqtt::start(
        &config.broker_uri,
        &client_id,
        &topics,
        router,
        FIRMWARE_VERSION,
    )?;

    // ── 6. Calibration worker ─────────────────────────────────
    let runner = CalibrationRunner::new(
        Arc::clone(&arbiter),
        Arc::clone(&coefficients),
        store,
        &config,
    );
    let worker_queue = Arc::clone(&calibration_queue);
    let _worker: std::thread::JoinHandle<()> = spawn_on_core(Core::App, 5, 8, "calib\0", move || {
        runner.serve(&worker_queue, LogEventSink::new())
    })?;

    // ── 7. Coordinator ────────────────────────────────────────
    let mut probe = Ds18b20Probe::new(pins::ONEWIRE_GPIO, pins::TEMPERATURE_ENABLE_GPIO);
    let mut ota = OtaWatcher::new(Arc::clone(&mailbox), HttpFirmwareUpdater::new());
    let mut coordinator = SamplingCoordinator::new(
        arbiter,
        coefficients,
        Arc::clone(&mailbox),
        calibration_queue,
        topics,
        &config,
    );
    let mut log_sink = LogEventSink::new();
    let mut watchdog = Watchdog::new(DEFAULT_TIMEOUT_MS);

    coordinator.announce(&mut log_sink);
    info!("System ready. Entering sampling loop.");

    loop {
        watchdog.feed();
        if !wifi.is_connected() {
            warn!("WiFi: connection lost, reconnecting");
            watchdog.suspend();
            wifi.connect();
            watchdog.resume();
        }

        coordinator.tick(&clock, &mut probe, &mut publisher, &mut log_sink);

        if mailbox.is_latched(CommandKind::FirmwareUpdate) {
            watchdog.suspend();
            // Success reboots; only a failure returns here.
            if let Some(Err(e)) = ota.poll(&mut log_sink) {
                warn!("OTA failed ({}), resuming sampling", e);
            }
            watchdog.resume();
        }

        std::thread::sleep(coordinator.tick_interval());
    }
}
