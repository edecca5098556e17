//! WiFi station-mode adapter.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`WifiStation`] drives the ESP-IDF WiFi
//!   driver through `esp_idf_svc::wifi::BlockingWifi`.
//! - **all targets**: credential validation and the reconnect backoff.
//!
//! Credentials are baked in at build time from `AQUASENSE_WIFI_SSID` and
//! `AQUASENSE_WIFI_PASS`.
//!
//! ## Reconnection policy
//!
//! On disconnect the station waits an exponential backoff (2 s → 4 s →
//! 8 s … capped at 60 s) before retrying.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(
                f,
                "password invalid (must be 8-64 bytes for WPA2, or empty for open)"
            ),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut c = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        c.ssid
            .push_str(ssid)
            .map_err(|()| ConnectivityError::InvalidSsid)?;
        c.password
            .push_str(password)
            .map_err(|()| ConnectivityError::InvalidPassword)?;
        Ok(c)
    }

    /// Credentials compiled into the image.
    pub fn from_build_env() -> Result<Self, ConnectivityError> {
        let ssid = option_env!("AQUASENSE_WIFI_SSID").ok_or(ConnectivityError::NoCredentials)?;
        Self::new(ssid, option_env!("AQUASENSE_WIFI_PASS").unwrap_or(""))
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Reconnect backoff
// ───────────────────────────────────────────────────────────────

const INITIAL_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    secs: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            secs: INITIAL_BACKOFF_SECS,
        }
    }

    /// Delay before the next attempt; doubles for the one after.
    pub fn next_delay_secs(&mut self) -> u32 {
        let current = self.secs;
        self.secs = (self.secs * 2).min(MAX_BACKOFF_SECS);
        current
    }

    pub fn reset(&mut self) {
        self.secs = INITIAL_BACKOFF_SECS;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF station
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::WifiStation;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::sys::EspError;
    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
    use log::{info, warn};

    use super::{Backoff, WifiCredentials};

    pub struct WifiStation {
        wifi: BlockingWifi<EspWifi<'static>>,
        backoff: Backoff,
    }

    impl WifiStation {
        pub fn new(
            modem: Modem,
            sysloop: EspSystemEventLoop,
            credentials: &WifiCredentials,
        ) -> Result<Self, EspError> {
            let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), None)?, sysloop)?;
            wifi.set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: credentials.ssid.clone(),
                password: credentials.password.clone(),
                auth_method: if credentials.is_open() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            }))?;
            wifi.start()?;
            info!("WiFi: station started, SSID='{}'", credentials.ssid);
            Ok(Self {
                wifi,
                backoff: Backoff::new(),
            })
        }

        /// Block until associated and the netif has an address.
        pub fn connect(&mut self) {
            loop {
                match self.wifi.connect().and_then(|()| self.wifi.wait_netif_up()) {
                    Ok(()) => {
                        self.backoff.reset();
                        info!("WiFi: connected");
                        return;
                    }
                    Err(e) => {
                        let delay = self.backoff.next_delay_secs();
                        warn!("WiFi: connect failed ({}), retrying in {}s", e, delay);
                        FreeRtos::delay_ms(delay * 1000);
                    }
                }
            }
        }

        pub fn is_connected(&self) -> bool {
            self.wifi.is_connected().unwrap_or(false)
        }
    }
}
