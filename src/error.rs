//! Error types for the AquaSense firmware.
//!
//! One `Copy` enum per subsystem so errors can be logged and passed around
//! without allocation.
//!
//! None of these are fatal inside the sampling/calibration core: each one is
//! handled at the component boundary and turned into a skipped cycle, a
//! default value, or a dropped command.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Converter (ADC) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterError {
    /// Another task holds the converter and the wait bound elapsed.
    Busy,
    /// No factory calibration data for this channel/attenuation.
    CalibrationUnavailable,
    /// Oneshot unit could not be created or configured (ESP-IDF rc).
    InitFailed(i32),
    /// A conversion returned an error (ESP-IDF rc).
    ReadFailed(i32),
    /// The channel is not wired to the ADC (e.g. the one-wire probe).
    NoAdcInput,
    /// A conversion was attempted while the unit is powered down.
    NotPowered,
}

impl fmt::Display for ConverterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "converter busy"),
            Self::CalibrationUnavailable => write!(f, "calibration scheme unavailable"),
            Self::InitFailed(rc) => write!(f, "ADC init failed (rc={rc})"),
            Self::ReadFailed(rc) => write!(f, "ADC read failed (rc={rc})"),
            Self::NoAdcInput => write!(f, "channel has no ADC input"),
            Self::NotPowered => write!(f, "ADC not powered"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors (one-wire probe)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// No presence pulse after bus reset.
    NoDevice,
    /// Scratchpad CRC did not match.
    CrcMismatch,
    /// Probe returned its power-on reset value (85 °C) or an impossible reading.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no one-wire device present"),
            Self::CrcMismatch => write!(f, "scratchpad CRC mismatch"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

// ---------------------------------------------------------------------------
// Calibration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    /// The converter could not be acquired or read.
    Converter(ConverterError),
    /// The new coefficient could not be persisted; in-memory value untouched.
    Storage(StorageError),
    /// The reference reading cannot produce a usable coefficient.
    InvalidReading(f32),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converter(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "persist failed: {e}"),
            Self::InvalidReading(v) => write!(f, "unusable reference reading {v:.3} V"),
        }
    }
}

impl From<ConverterError> for CalibrationError {
    fn from(e: ConverterError) -> Self {
        Self::Converter(e)
    }
}

impl From<StorageError> for CalibrationError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Topic is not one of ours.
    UnknownTopic,
    /// Payload is not valid UTF-8.
    InvalidUtf8,
    /// Payload could not be parsed as a finite number.
    InvalidNumber,
    /// Firmware URL is empty.
    EmptyUrl,
    /// Firmware URL exceeds the 255-byte buffer.
    UrlTooLong,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTopic => write!(f, "unknown topic"),
            Self::InvalidUtf8 => write!(f, "payload is not UTF-8"),
            Self::InvalidNumber => write!(f, "payload is not a finite number"),
            Self::EmptyUrl => write!(f, "firmware URL is empty"),
            Self::UrlTooLong => write!(f, "firmware URL longer than 255 bytes"),
        }
    }
}
