//! Wall-clock adapters implementing [`Clock`].
//!
//! - **`target_os = "espidf"`**: [`Esp32TimeAdapter`] reads the system
//!   time kept by SNTP and breaks it down with `localtime_r` under the
//!   configured `TZ`.
//! - **all targets**: [`SimClock`] holds a settable epoch for host tests.
//!
//! Any time before 2020-01-01 is treated as "not synchronised yet".

use core::cell::Cell;

use crate::app::ports::{Clock, LocalTime};

/// 2020-01-01T00:00:00Z.  Anything earlier is the RTC's power-on value.
pub const EPOCH_2020: i64 = 1_577_836_800;

pub fn is_synced(epoch_secs: i64) -> bool {
    epoch_secs >= EPOCH_2020
}

// ── ESP-IDF ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct Esp32TimeAdapter;

#[cfg(target_os = "espidf")]
impl Esp32TimeAdapter {
    /// Apply a POSIX `TZ` string (e.g. `CET-1CEST,M3.5.0,M10.5.0/3`).
    pub fn new(timezone: &str) -> Self {
        set_timezone(timezone);
        Self
    }

    /// Seconds since boot (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000
    }
}

#[cfg(target_os = "espidf")]
fn set_timezone(timezone: &str) {
    let Ok(tz) = std::ffi::CString::new(timezone) else {
        log::warn!("time: invalid TZ string, keeping UTC");
        return;
    };
    // SAFETY: both strings are NUL-terminated and outlive the call; setenv
    // copies them.
    unsafe {
        esp_idf_svc::sys::setenv(c"TZ".as_ptr(), tz.as_ptr(), 1);
        esp_idf_svc::sys::tzset();
    }
    log::info!("time: TZ={}", timezone);
}

#[cfg(target_os = "espidf")]
impl Clock for Esp32TimeAdapter {
    fn local_time(&self) -> Option<LocalTime> {
        use core::ptr;
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return None;
        }
        let epoch_secs = tv.tv_sec as i64;
        if !is_synced(epoch_secs) {
            return None;
        }
        let secs = tv.tv_sec as esp_idf_svc::sys::time_t;
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        Some(LocalTime {
            epoch_secs,
            year: tm.tm_year + 1900,
            month: (tm.tm_mon + 1) as u8,
            day: tm.tm_mday as u8,
            hour: tm.tm_hour as u8,
            minute: tm.tm_min as u8,
            second: tm.tm_sec as u8,
        })
    }
}

// ── Simulation ────────────────────────────────────────────────

/// Settable UTC clock.
#[derive(Debug, Default)]
pub struct SimClock {
    epoch_secs: Cell<i64>,
}

impl SimClock {
    pub fn new(epoch_secs: i64) -> Self {
        Self {
            epoch_secs: Cell::new(epoch_secs),
        }
    }

    pub fn set(&self, epoch_secs: i64) {
        self.epoch_secs.set(epoch_secs);
    }

    pub fn advance(&self, secs: i64) {
        self.epoch_secs.set(self.epoch_secs.get() + secs);
    }
}

impl Clock for SimClock {
    fn local_time(&self) -> Option<LocalTime> {
        let now = self.epoch_secs.get();
        is_synced(now).then(|| LocalTime::from_epoch_utc(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_on_clock_is_unsynced() {
        assert_eq!(SimClock::default().local_time(), None);
        assert_eq!(SimClock::new(EPOCH_2020 - 1).local_time(), None);
    }

    #[test]
    fn synced_clock_reports_utc() {
        let clock = SimClock::new(EPOCH_2020);
        let t = clock.local_time().unwrap();
        assert_eq!(t.iso8601().as_str(), "2020-01-01T00:00:00");
        clock.advance(3661);
        assert_eq!(clock.local_time().unwrap().iso8601().as_str(), "2020-01-01T01:01:01");
    }
}
