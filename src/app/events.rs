//! Outbound application events.
//!
//! The coordinator and the calibration worker emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them (serial log today).

use crate::app::commands::CommandKind;
use crate::app::coordinator::CycleState;
use crate::app::telemetry::Quantity;
use crate::calibration::CalibrationCoefficients;
use crate::calibration::runner::CalibrationJob;
use crate::error::{CommandError, ConverterError};

/// Why a due sampling cycle did not produce readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    /// The converter stayed locked past the sampling bound.
    ConverterBusy,
    /// The converter was acquired but a conversion failed.
    Converter(ConverterError),
}

/// Structured events emitted by the core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Coordinator constructed; carries the epoch length in seconds.
    Started { sample_interval_secs: u32 },

    /// The sampling cycle moved between states.
    CycleStateChanged { from: CycleState, to: CycleState },

    /// A due cycle was abandoned; the epoch stays unsampled.
    CycleSkipped(SkipReason),

    /// One quantity was handed to the publisher.
    ReadingPublished { quantity: Quantity, value: f32 },

    /// A latched command was consumed.
    CommandHandled(CommandKind),

    /// An inbound message was dropped without touching any latch.
    CommandRejected(CommandError),

    /// A calibration job was accepted by the worker queue.
    CalibrationQueued(CalibrationJob),

    /// New coefficients are persisted and live.
    CalibrationApplied(CalibrationCoefficients),
}
