//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the device if the coordinator loop
//! stalls for longer than the configured timeout.
//!
//! The loop must call `feed()` on every tick.  A firmware download runs
//! on the same task and can take far longer than one tick, so the task is
//! unsubscribed around it with `suspend()` / `resume()`.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::{info, warn};

/// Worst-case tick: 2.5 s converter wait, three averaging bursts and a
/// 750 ms probe conversion, with margin.
pub const DEFAULT_TIMEOUT_MS: u32 = 15_000;

pub struct Watchdog {
    subscribed: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}

impl Watchdog {
    /// Initialise and subscribe the current task to the TWDT.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            // SAFETY: plain config struct passed by reference.
            let ret = unsafe { esp_task_wdt_reconfigure(&cfg) };
            if ret != ESP_OK as i32 {
                warn!("TWDT reconfigure returned {} (may already be configured)", ret);
            }
            let mut wdt = Self { subscribed: false };
            wdt.resume();
            if wdt.subscribed {
                info!("Watchdog: subscribed ({}ms timeout, panic on trigger)", timeout_ms);
            }
            wdt
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("Watchdog(sim): no-op ({}ms)", timeout_ms);
            Self { subscribed: true }
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Feed the watchdog.  No-op while suspended.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: the current task is subscribed.
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }

    /// Unsubscribe the current task.
    pub fn suspend(&mut self) {
        if !self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: null selects the calling task, which is subscribed.
            let ret = unsafe { esp_task_wdt_delete(core::ptr::null_mut()) };
            if ret != ESP_OK as i32 {
                warn!("Watchdog: unsubscribe failed ({})", ret);
                return;
            }
        }
        self.subscribed = false;
    }

    /// Subscribe the current task again.
    pub fn resume(&mut self) {
        if self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: null selects the calling task.
            let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
            if ret != ESP_OK as i32 {
                warn!("Watchdog: failed to subscribe ({})", ret);
                return;
            }
        }
        self.subscribed = true;
    }
}
