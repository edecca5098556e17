//! Calibration worker.
//!
//! Jobs arrive over a bounded [`CalibrationQueue`] from the coordinator and
//! are executed one at a time on a dedicated task:
//!
//! 1. acquire the converter (6 s bound by default; timeout aborts the job)
//! 2. take one averaged voltage reading in the reference solution
//! 3. persist the new coefficient
//! 4. swap it into the shared snapshot
//!
//! A failure at any step leaves both flash and memory untouched.

use std::sync::Arc;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use super::store::CalibrationStore;
use super::{CalibrationCoefficients, CoefficientField, SharedCoefficients};
use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, StoragePort};
use crate::config::SystemConfig;
use crate::converter::{ConverterArbiter, ConverterHal};
use crate::error::CalibrationError;
use crate::sensors::SensorChannel;
use crate::sensors::ph::BUFFER_HIGH;

/// Pending jobs the queue holds before the coordinator backs off.
pub const QUEUE_DEPTH: usize = 2;

pub type CalibrationQueue = Channel<CriticalSectionRawMutex, CalibrationJob, QUEUE_DEPTH>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationJob {
    /// Probe sits in a pH buffer of the given value.
    Ph { reference: f32 },
    /// Probe sits in a solution of the given TDS (ppm).
    Tds { reference: f32 },
}

impl CalibrationJob {
    fn channel(self) -> SensorChannel {
        match self {
            Self::Ph { .. } => SensorChannel::Ph,
            Self::Tds { .. } => SensorChannel::Tds,
        }
    }
}

pub struct CalibrationRunner<H: ConverterHal, S: StoragePort> {
    arbiter: Arc<ConverterArbiter<H>>,
    coefficients: Arc<SharedCoefficients>,
    store: CalibrationStore<S>,
    lock_timeout: Duration,
    samples: u16,
}

impl<H: ConverterHal, S: StoragePort> CalibrationRunner<H, S> {
    pub fn new(
        arbiter: Arc<ConverterArbiter<H>>,
        coefficients: Arc<SharedCoefficients>,
        store: CalibrationStore<S>,
        config: &SystemConfig,
    ) -> Self {
        Self {
            arbiter,
            coefficients,
            store,
            lock_timeout: Duration::from_millis(u64::from(config.calibration_lock_timeout_ms)),
            samples: config.samples_per_reading,
        }
    }

    /// Execute one job.  Returns the coefficients now live.
    pub fn run(&mut self, job: CalibrationJob) -> Result<CalibrationCoefficients, CalibrationError> {
        let voltage = {
            let mut lease = self.arbiter.acquire(self.lock_timeout)?;
            lease.average_voltage(job.channel(), self.samples)?
        };

        let (field, value) = match job {
            CalibrationJob::Ph { reference } => {
                let field = if reference == BUFFER_HIGH {
                    CoefficientField::PhVoltage918
                } else {
                    CoefficientField::PhVoltage686
                };
                (field, voltage)
            }
            CalibrationJob::Tds { reference } => {
                if !voltage.is_finite() || voltage <= 0.0 {
                    return Err(CalibrationError::InvalidReading(voltage));
                }
                (CoefficientField::TdsFactor, reference / voltage)
            }
        };
        if !value.is_finite() {
            return Err(CalibrationError::InvalidReading(voltage));
        }

        self.store.save(field, value)?;
        Ok(self.coefficients.update(field, value))
    }

    /// Run one job and report the outcome.
    pub fn handle(&mut self, job: CalibrationJob, sink: &mut impl EventSink) {
        info!("calibration: starting {:?}", job);
        match self.run(job) {
            Ok(coefficients) => sink.emit(&AppEvent::CalibrationApplied(coefficients)),
            Err(e) => warn!("calibration: {:?} aborted: {}", job, e),
        }
    }

    /// Execute every job currently queued without blocking.  Returns the
    /// number handled.
    pub fn run_pending(&mut self, queue: &CalibrationQueue, sink: &mut impl EventSink) -> usize {
        let mut handled = 0;
        while let Ok(job) = queue.try_receive() {
            self.handle(job, sink);
            handled += 1;
        }
        handled
    }

    /// Worker loop: block on the queue forever.
    pub fn serve(mut self, queue: &CalibrationQueue, mut sink: impl EventSink) -> ! {
        info!("calibration: worker ready");
        loop {
            let job = futures_lite::future::block_on(queue.receive());
            self.handle(job, &mut sink);
        }
    }
}
