//! Converter arbiter: exclusive, time-bounded access to the single ADC.
//!
//! ```text
//!   SamplingCoordinator ──┐
//!                         ├──▶ ConverterArbiter::acquire(timeout) ──▶ Lease ──▶ ConverterHal
//!   CalibrationRunner ────┘
//! ```
//!
//! The ADC unit is created when a [`Lease`] is granted and torn down when
//! the lease is dropped, on every exit path.  Waiting for a held
//! converter sleeps between attempts; it never spins.
//!
//! Voltage conversions build a calibration mapping per call and delete it
//! before returning, so no mapping outlives the read that used it.

use core::time::Duration;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::config::SystemConfig;
use crate::error::ConverterError;
use crate::sensors::SensorChannel;

/// Full-scale count of the 12-bit converter.
pub const RAW_FULL_SCALE: f32 = 4095.0;
/// Usable input range at 12 dB attenuation, used when no calibration
/// scheme is available.
pub const UNCALIBRATED_FULL_SCALE_V: f32 = 2.45;

/// Interval between lock attempts while another task holds the converter.
const ACQUIRE_POLL: Duration = Duration::from_millis(10);

/// ADC1 channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdcInput(pub u32);

/// Input attenuation (selects the measurable voltage range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attenuation {
    Db0,
    Db2_5,
    Db6,
    Db12,
}

/// Hardware behind the arbiter: the oneshot ADC unit, the calibration
/// scheme, the sensor supply pins and a blocking delay.
pub trait ConverterHal: DelayNs {
    /// Opaque per-conversion calibration mapping.
    type Calibration;

    /// Create and configure the ADC unit.
    fn power_up(&mut self) -> Result<(), ConverterError>;

    /// Delete the ADC unit.  Must be safe to call when already down.
    fn power_down(&mut self);

    fn read_raw(&mut self, input: AdcInput) -> Result<u16, ConverterError>;

    fn calibration_create(
        &mut self,
        input: AdcInput,
        attenuation: Attenuation,
    ) -> Result<Self::Calibration, ConverterError>;

    fn calibration_raw_to_mv(
        &mut self,
        calibration: &Self::Calibration,
        raw: u16,
    ) -> Result<u32, ConverterError>;

    fn calibration_delete(&mut self, calibration: Self::Calibration);

    /// Drive a sensor supply-enable pin.
    fn set_sensor_power(&mut self, gpio: i32, on: bool);
}

/// Volts for a raw count without a calibration scheme.
pub fn uncalibrated_volts(raw: u16) -> f32 {
    f32::from(raw) * UNCALIBRATED_FULL_SCALE_V / RAW_FULL_SCALE
}

// ───────────────────────────────────────────────────────────────
// Arbiter
// ───────────────────────────────────────────────────────────────

/// Owns the converter and hands out exclusive [`Lease`]s.
///
/// Share it between tasks behind an `Arc`.
pub struct ConverterArbiter<H: ConverterHal> {
    hal: Mutex<CriticalSectionRawMutex, H>,
    settle_ms: u32,
    spacing_ms: u32,
}

impl<H: ConverterHal> ConverterArbiter<H> {
    pub fn new(hal: H, settle_ms: u32, spacing_ms: u32) -> Self {
        Self {
            hal: Mutex::new(hal),
            settle_ms,
            spacing_ms,
        }
    }

    pub fn from_config(hal: H, config: &SystemConfig) -> Self {
        Self::new(hal, config.settle_ms, config.sample_spacing_ms)
    }

    /// Wait up to `timeout` for exclusive use of the converter, then
    /// power it up.
    ///
    /// Returns [`ConverterError::Busy`] once the bound elapses, or the
    /// power-up error (the converter is released again in that case).
    pub fn acquire(&self, timeout: Duration) -> Result<Lease<'_, H>, ConverterError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(mut guard) = self.hal.try_lock() {
                guard.power_up()?;
                debug!("converter: lease granted");
                return Ok(Lease {
                    guard,
                    settle_pending: true,
                    settle_ms: self.settle_ms,
                    spacing_ms: self.spacing_ms,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ConverterError::Busy);
            }
            std::thread::sleep(ACQUIRE_POLL.min(deadline - now));
        }
    }

    /// Power down and give the converter back.  Equivalent to dropping
    /// the lease.
    pub fn release(&self, lease: Lease<'_, H>) {
        drop(lease);
    }

    /// Run `f` against the HAL if nobody holds a lease right now.
    pub fn inspect<R>(&self, f: impl FnOnce(&mut H) -> R) -> Option<R> {
        self.hal.try_lock().ok().map(|mut guard| f(&mut guard))
    }
}

// ───────────────────────────────────────────────────────────────
// Lease
// ───────────────────────────────────────────────────────────────

/// Exclusive, powered access to the converter.
///
/// Dropping the lease powers the ADC down and frees the arbiter.
pub struct Lease<'a, H: ConverterHal> {
    guard: MutexGuard<'a, CriticalSectionRawMutex, H>,
    settle_pending: bool,
    settle_ms: u32,
    spacing_ms: u32,
}

impl<H: ConverterHal> Lease<'_, H> {
    /// One conversion.  The first read of each lease waits the settle
    /// time first.
    pub fn read_raw(&mut self, channel: SensorChannel) -> Result<u16, ConverterError> {
        let input = channel.adc_input().ok_or(ConverterError::NoAdcInput)?;
        self.settle();
        self.guard.read_raw(input)
    }

    /// One conversion scaled to volts through a transient calibration
    /// mapping.  Without a scheme the fixed 2.45 V / 4095 scale is used.
    pub fn read_voltage(&mut self, channel: SensorChannel) -> Result<f32, ConverterError> {
        let input = channel.adc_input().ok_or(ConverterError::NoAdcInput)?;
        self.settle();

        let hal = &mut *self.guard;
        match hal.calibration_create(input, channel.attenuation()) {
            Ok(calibration) => {
                let mv = hal
                    .read_raw(input)
                    .and_then(|raw| hal.calibration_raw_to_mv(&calibration, raw));
                hal.calibration_delete(calibration);
                Ok(mv? as f32 / 1000.0)
            }
            Err(e) => {
                warn!(
                    "converter: {} on {} ({}), using uncalibrated scale",
                    e,
                    channel.name(),
                    input.0
                );
                hal.read_raw(input).map(uncalibrated_volts)
            }
        }
    }

    /// Mean of `samples` raw conversions (at least one).
    pub fn average_raw(
        &mut self,
        channel: SensorChannel,
        samples: u16,
    ) -> Result<f32, ConverterError> {
        self.burst(channel, samples, |lease| {
            lease.read_raw(channel).map(f32::from)
        })
    }

    /// Mean of `samples` calibrated voltage conversions (at least one).
    pub fn average_voltage(
        &mut self,
        channel: SensorChannel,
        samples: u16,
    ) -> Result<f32, ConverterError> {
        self.burst(channel, samples, |lease| lease.read_voltage(channel))
    }

    /// Power the sensor, take `samples` readings spaced by the configured
    /// gap, and power it off again whatever the outcome.
    fn burst(
        &mut self,
        channel: SensorChannel,
        samples: u16,
        mut read: impl FnMut(&mut Self) -> Result<f32, ConverterError>,
    ) -> Result<f32, ConverterError> {
        let n = samples.max(1);
        let gpio = channel.enable_gpio();
        self.guard.set_sensor_power(gpio, true);

        let mut result = Ok(0.0f32);
        for i in 0..n {
            if i > 0 {
                self.guard.delay_ms(self.spacing_ms);
            }
            match read(self) {
                Ok(v) => {
                    if let Ok(sum) = result.as_mut() {
                        *sum += v;
                    }
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.guard.set_sensor_power(gpio, false);
        result.map(|sum| sum / f32::from(n))
    }

    fn settle(&mut self) {
        if self.settle_pending {
            self.settle_pending = false;
            self.guard.delay_ms(self.settle_ms);
        }
    }
}

impl<H: ConverterHal> Drop for Lease<'_, H> {
    fn drop(&mut self) {
        self.guard.power_down();
        debug!("converter: lease released");
    }
}
