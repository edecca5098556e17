//! Port traits: the boundary between the sampling/calibration core and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SamplingCoordinator / CalibrationRunner
//! ```
//!
//! Driven adapters (MQTT, SNTP clock, one-wire probe, NVS, OTA) implement
//! these traits.  The coordinator consumes them via generics, so the core
//! never touches the network stack or flash directly and every path can be
//! exercised on the host.
//!
//! The ADC itself sits behind [`ConverterHal`](crate::converter::ConverterHal)
//! because it is owned by the arbiter rather than passed per call.

use core::fmt;

use crate::config::SystemConfig;
use crate::error::SensorError;

// ───────────────────────────────────────────────────────────────
// Publisher (domain → broker)
// ───────────────────────────────────────────────────────────────

/// Outbound message sink.  One call per MQTT publish.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

// ───────────────────────────────────────────────────────────────
// Clock (SNTP-synchronised wall time)
// ───────────────────────────────────────────────────────────────

/// Broken-down local time plus the raw epoch it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    /// Seconds since 1970-01-01T00:00:00Z.
    pub epoch_secs: i64,
    pub year: i32,
    /// 1–12
    pub month: u8,
    /// 1–31
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// ISO-8601 timestamp without zone suffix: `YYYY-MM-DDTHH:MM:SS`.
pub type Timestamp = heapless::String<24>;

impl LocalTime {
    /// Civil date/time for a UTC epoch (no zone offset applied).
    pub fn from_epoch_utc(epoch_secs: i64) -> Self {
        let days = epoch_secs.div_euclid(86_400);
        let secs_of_day = epoch_secs.rem_euclid(86_400);

        // Howard Hinnant's days-from-civil inverse.
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + i64::from(month <= 2);

        Self {
            epoch_secs,
            year: year as i32,
            month: month as u8,
            day: day as u8,
            hour: (secs_of_day / 3600) as u8,
            minute: (secs_of_day % 3600 / 60) as u8,
            second: (secs_of_day % 60) as u8,
        }
    }

    /// Civil date/time `offset_secs` east of UTC; `epoch_secs` stays UTC.
    pub fn from_epoch_with_offset(epoch_secs: i64, offset_secs: i64) -> Self {
        Self {
            epoch_secs,
            ..Self::from_epoch_utc(epoch_secs + offset_secs)
        }
    }

    /// Seconds from 1970-01-01T00:00:00 to this reading on the local
    /// wall clock.  Equals `epoch_secs` only when the zone is UTC.
    pub fn wall_secs(&self) -> i64 {
        // Howard Hinnant's days-from-civil.
        let y = i64::from(self.year) - i64::from(self.month <= 2);
        let m = i64::from(self.month);
        let era = y.div_euclid(400);
        let yoe = y.rem_euclid(400);
        let mp = if m > 2 { m - 3 } else { m + 9 };
        let doy = (153 * mp + 2) / 5 + i64::from(self.day) - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        let days = era * 146_097 + doe - 719_468;
        days * 86_400
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    pub fn iso8601(&self) -> Timestamp {
        use core::fmt::Write;
        let mut s = Timestamp::new();
        let _ = write!(
            s,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        );
        s
    }
}

/// Wall-clock source.  `None` until the clock has been synchronised.
pub trait Clock {
    fn local_time(&self) -> Option<LocalTime>;
}

// ───────────────────────────────────────────────────────────────
// Temperature probe (one-wire, read outside the converter lease)
// ───────────────────────────────────────────────────────────────

pub trait TemperatureProbe {
    /// Trigger a conversion and return the result in °C.
    fn measure_celsius(&mut self) -> Result<f32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Firmware updater
// ───────────────────────────────────────────────────────────────

/// Downloads and installs a new image.  On success the implementation
/// restarts the device and never returns `Ok` on real hardware.
pub trait FirmwareUpdater {
    fn update(&mut self, url: &str) -> Result<(), UpdateError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`SystemConfig`].
///
/// Implementations MUST validate before persisting and reject
/// out-of-range values with [`ConfigError::ValidationFailed`] rather than
/// clamping them.
pub trait ConfigPort {
    /// Returns [`SystemConfig::default()`] if nothing is stored.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (NVS blobs)
// ───────────────────────────────────────────────────────────────

/// Namespaced key/blob storage.
///
/// Writes MUST be atomic per key: a power loss leaves either the old or
/// the new value, never a torn one.  ESP-IDF NVS guarantees this per
/// `nvs_commit()`.
pub trait StoragePort {
    /// Read a value into `buf`.  Returns the number of bytes copied.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// Broker session is down; the message was not queued.
    NotConnected,
    /// The client rejected the message (outbox full, topic too long).
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// HTTP connection could not be opened or the request failed.
    Connection,
    /// Server answered with a non-2xx status.
    HttpStatus(u16),
    /// Download finished with zero bytes.
    EmptyImage,
    /// Writing or activating the OTA partition failed.
    Flash,
    /// Another update is already running.
    Busy,
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound,
    /// Stored config failed deserialisation.
    Corrupted,
    /// A field failed range validation; the string names it.
    ValidationFailed(&'static str),
    StorageFull,
    IoError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
    /// Present but with the wrong size or an unusable value.
    Corrupt,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "broker not connected"),
            Self::Rejected => write!(f, "publish rejected"),
        }
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "download connection failed"),
            Self::HttpStatus(code) => write!(f, "download failed with HTTP {}", code),
            Self::EmptyImage => write!(f, "firmware image is empty"),
            Self::Flash => write!(f, "OTA partition write failed"),
            Self::Busy => write!(f, "update already in progress"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupt => write!(f, "stored value corrupt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_zero_is_unix_origin() {
        let t = LocalTime::from_epoch_utc(0);
        assert_eq!((t.year, t.month, t.day), (1970, 1, 1));
        assert_eq!(t.iso8601().as_str(), "1970-01-01T00:00:00");
    }

    #[test]
    fn civil_conversion_handles_leap_day() {
        // 2024-02-29T13:45:30Z
        let t = LocalTime::from_epoch_utc(1_709_214_330);
        assert_eq!(t.iso8601().as_str(), "2024-02-29T13:45:30");
    }

    #[test]
    fn civil_conversion_end_of_year() {
        // 2025-12-31T23:59:59Z
        let t = LocalTime::from_epoch_utc(1_767_225_599);
        assert_eq!((t.year, t.month, t.day), (2025, 12, 31));
        assert_eq!((t.hour, t.minute, t.second), (23, 59, 59));
    }

    #[test]
    fn wall_secs_matches_epoch_in_utc() {
        for epoch in [0, 1_709_214_330, 1_767_225_599] {
            assert_eq!(LocalTime::from_epoch_utc(epoch).wall_secs(), epoch);
        }
    }

    #[test]
    fn half_hour_offset_shifts_wall_clock_only() {
        // 2025-03-01T04:30:00Z is 10:00 in UTC+05:30.
        let t = LocalTime::from_epoch_with_offset(1_740_803_400, 19_800);
        assert_eq!(t.epoch_secs, 1_740_803_400);
        assert_eq!(t.iso8601().as_str(), "2025-03-01T10:00:00");
        assert_eq!(t.wall_secs(), 1_740_823_200);
    }
}
