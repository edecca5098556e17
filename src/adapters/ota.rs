//! Firmware download and install, backed by the `esp-ota` crate.
//!
//! Flow: begin → N × write → finalize → set boot partition → restart
//!
//! [`OtaSession`] tracks the partition write; [`stream_image`] pumps any
//! byte source through it.  On ESP-IDF, [`HttpFirmwareUpdater`] feeds it
//! from an HTTP GET and implements the [`FirmwareUpdater`] port.
//!
//! [`FirmwareUpdater`]: crate::app::ports::FirmwareUpdater

use core::fmt;

use log::{info, warn};

use crate::app::ports::UpdateError;

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB
pub const CHUNK_SIZE: usize = 4096;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    AlreadyInProgress,
    BeginFailed,
    WriteFailed,
    VerifyFailed,
    BootSetFailed,
    NotReceiving,
    EmptyImage,
    Overflow,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "OTA session already in progress"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::VerifyFailed => write!(f, "OTA verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::NotReceiving => write!(f, "operation requires active Receiving state"),
            Self::EmptyImage => write!(f, "no bytes written before finalize"),
            Self::Overflow => write!(f, "image exceeds 4 MB partition limit"),
        }
    }
}

impl From<OtaError> for UpdateError {
    fn from(e: OtaError) -> Self {
        match e {
            OtaError::AlreadyInProgress => Self::Busy,
            OtaError::EmptyImage => Self::EmptyImage,
            _ => Self::Flash,
        }
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving { bytes_written: u32 },
    ReadyToReboot,
    Failed,
}

/// One write into the inactive OTA partition.
///
/// On ESP-IDF targets, uses the `esp-ota` crate for partition management.
/// On simulation targets only the byte accounting runs.
pub struct OtaSession {
    state: OtaState,
    #[cfg(target_os = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
}

impl OtaSession {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            #[cfg(target_os = "espidf")]
            ota_update: None,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Open the inactive partition.
    pub fn begin(&mut self) -> Result<(), OtaError> {
        if matches!(self.state, OtaState::Receiving { .. }) {
            return Err(OtaError::AlreadyInProgress);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                OtaError::BeginFailed
            })?;
            self.ota_update = Some(update);
        }

        self.state = OtaState::Receiving { bytes_written: 0 };
        info!("OTA: begin");
        Ok(())
    }

    /// Append a chunk.  Returns total bytes written.
    pub fn write(&mut self, data: &[u8]) -> Result<u32, OtaError> {
        let OtaState::Receiving { bytes_written } = self.state else {
            return Err(OtaError::NotReceiving);
        };
        let total = bytes_written.saturating_add(data.len() as u32);
        if total > MAX_FIRMWARE_SIZE {
            self.abort();
            return Err(OtaError::Overflow);
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(OtaError::NotReceiving);
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return Err(OtaError::WriteFailed);
            }
        }

        self.state = OtaState::Receiving {
            bytes_written: total,
        };
        Ok(total)
    }

    /// Verify the image and mark the partition bootable.
    pub fn finalize(&mut self) -> Result<u32, OtaError> {
        let bytes_written = match self.state {
            OtaState::Receiving { bytes_written: 0 } => {
                self.abort();
                return Err(OtaError::EmptyImage);
            }
            OtaState::Receiving { bytes_written } => bytes_written,
            _ => return Err(OtaError::NotReceiving),
        };

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                self.state = OtaState::Failed;
                return Err(OtaError::NotReceiving);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::BootSetFailed
            })?;
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: finalized {} bytes, ready to reboot", bytes_written);
        Ok(bytes_written)
    }

    /// Abort the current session; resets to Idle.
    pub fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts automatically when OtaUpdate is dropped
            self.ota_update.take();
        }
        self.state = OtaState::Idle;
        warn!("OTA: aborted");
    }

    /// Soft-reset into the newly flashed firmware.
    #[cfg(target_os = "espidf")]
    pub fn reboot(&self) -> ! {
        info!("OTA: rebooting into new firmware");
        esp_ota::restart();
    }
}

impl Default for OtaSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Pump `read` into a fresh session until it returns 0, then finalize.
/// Any read or write failure aborts the session.
pub fn stream_image(
    session: &mut OtaSession,
    mut read: impl FnMut(&mut [u8]) -> Result<usize, UpdateError>,
) -> Result<u32, UpdateError> {
    session.begin()?;
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = match read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                session.abort();
                return Err(e);
            }
        };
        session.write(&chunk[..n])?;
    }
    Ok(session.finalize()?)
}

// ── HTTP updater (ESP-IDF) ────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use http::HttpFirmwareUpdater;

#[cfg(target_os = "espidf")]
mod http {
    use core::time::Duration;

    use embedded_svc::http::Method;
    use embedded_svc::http::client::Client as HttpClient;
    use embedded_svc::io::Read;
    use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};
    use log::{info, warn};

    use super::{OtaSession, stream_image};
    use crate::app::ports::{FirmwareUpdater, UpdateError};

    /// Downloads an image over HTTP(S) and reboots into it.
    pub struct HttpFirmwareUpdater {
        session: OtaSession,
    }

    impl HttpFirmwareUpdater {
        pub fn new() -> Self {
            Self {
                session: OtaSession::new(),
            }
        }
    }

    impl Default for HttpFirmwareUpdater {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FirmwareUpdater for HttpFirmwareUpdater {
        fn update(&mut self, url: &str) -> Result<(), UpdateError> {
            let http_conf = HttpClientConfiguration {
                timeout: Some(Duration::from_secs(30)),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            };
            let conn = EspHttpConnection::new(&http_conf).map_err(|e| {
                warn!("OTA: http client init failed: {:?}", e);
                UpdateError::Connection
            })?;
            let mut client = HttpClient::wrap(conn);
            let request = client
                .request(Method::Get, url, &[])
                .map_err(|_| UpdateError::Connection)?;
            let mut response = request.submit().map_err(|_| UpdateError::Connection)?;

            let status = response.status();
            if !(200..300).contains(&status) {
                return Err(UpdateError::HttpStatus(status));
            }

            let written = stream_image(&mut self.session, |buf| {
                response.read(buf).map_err(|e| {
                    warn!("OTA: download interrupted: {:?}", e);
                    UpdateError::Connection
                })
            })?;
            info!("OTA: {} bytes installed from {}", written, url);
            self.session.reboot();
        }
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader cancels rollback.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}

// ── Tests ─────────────────────────────────────────────────────
