//! Log-based adapters.
//!
//! [`LogEventSink`] writes application events to the ESP-IDF logger
//! (UART / USB-CDC in production).  [`LogPublisher`] stands in for the
//! broker in simulation builds and keeps the last messages for tests.

use log::{info, warn};

use crate::app::events::{AppEvent, SkipReason};
use crate::app::ports::{EventSink, PublishError, Publisher};

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started {
                sample_interval_secs,
            } => {
                info!("START | epoch={}s", sample_interval_secs);
            }
            AppEvent::CycleStateChanged { from, to } => {
                info!("CYCLE | {:?} -> {:?}", from, to);
            }
            AppEvent::CycleSkipped(SkipReason::ConverterBusy) => {
                warn!("CYCLE | skipped, converter busy");
            }
            AppEvent::CycleSkipped(SkipReason::Converter(e)) => {
                warn!("CYCLE | skipped, {}", e);
            }
            AppEvent::ReadingPublished { quantity, value } => {
                info!("TELEM | {}={:.2}", quantity.name(), value);
            }
            AppEvent::CommandHandled(kind) => {
                info!("CMD   | {} handled", kind.topic_suffix());
            }
            AppEvent::CommandRejected(e) => {
                warn!("CMD   | rejected: {}", e);
            }
            AppEvent::CalibrationQueued(job) => {
                info!("CALIB | queued {:?}", job);
            }
            AppEvent::CalibrationApplied(c) => {
                info!(
                    "CALIB | applied pH6.86={:.3}V pH9.18={:.3}V tds_factor={:.3}",
                    c.ph_voltage_at_6_86, c.ph_voltage_at_9_18, c.tds_correction_factor
                );
            }
        }
    }
}

/// Publisher that logs messages instead of sending them.
#[derive(Debug, Default)]
pub struct LogPublisher {
    pub sent: Vec<(String, String)>,
    pub connected: bool,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            connected: true,
        }
    }
}

impl Publisher for LogPublisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if !self.connected {
            return Err(PublishError::NotConnected);
        }
        info!("PUB   | {} {}", topic, payload);
        self.sent.push((topic.into(), payload.into()));
        Ok(())
    }
}
