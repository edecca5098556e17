//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`].
//!
//! - Config validation: all fields are range-checked before persistence.
//! - Namespace isolation: the system config lives in `aquasense`, the
//!   calibration coefficients in `calibration`.
//! - Atomic writes: ESP-IDF NVS commits are atomic per nvs_commit().
//!
//! The simulation backend keeps everything in a map and is what the host
//! tests run against.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "aquasense";
const CONFIG_KEY: &str = "syscfg";

/// Largest blob `load` will allocate for.
#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 4000;
/// NVS namespace and key names are limited to 15 bytes.
#[cfg(target_os = "espidf")]
const MAX_NAME_LEN: usize = 15;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// A partition that is full or was written by a newer IDF is erased
    /// and initialised again; any other failure is `ConfigError::IoError`.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called from the main task before any other NVS user
            // exists.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32
            {
                warn!("NVS: partition unusable ({}), erasing", ret);
                if unsafe { nvs_flash_erase() } != ESP_OK as i32
                    || unsafe { nvs_flash_init() } != ESP_OK as i32
                {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK as i32 {
                return Err(ConfigError::IoError);
            }
            info!("NVS: flash ready");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NVS: in-memory backend");

        Ok(Self::unbacked())
    }

    fn unbacked() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        }
    }

    /// Whole blob under `namespace`/`key`, sized from the stored length.
    fn get_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .get(&Self::composite_key(namespace, key))
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        #[cfg(target_os = "espidf")]
        {
            let key = c_name(key)?;
            with_handle(namespace, false, |handle| {
                let mut size = 0usize;
                // SAFETY: null buffer asks NVS for the stored length only.
                check(unsafe { nvs_get_blob(handle, key.as_ptr(), core::ptr::null_mut(), &mut size) })?;
                if size > MAX_BLOB_SIZE {
                    return Err(StorageError::Corrupt);
                }
                let mut buf = vec![0u8; size];
                // SAFETY: `buf` holds exactly `size` bytes.
                check(unsafe {
                    nvs_get_blob(handle, key.as_ptr(), buf.as_mut_ptr().cast(), &mut size)
                })?;
                buf.truncate(size);
                Ok(buf)
            })
        }
    }

    /// Store and commit one blob.  Takes `&self`: NVS serialises access.
    fn put_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = c_name(key)?;
            with_handle(namespace, true, |handle| {
                // SAFETY: `data` outlives the call; NVS copies it.
                check(unsafe {
                    nvs_set_blob(handle, key.as_ptr(), data.as_ptr().cast(), data.len())
                })?;
                check(unsafe { nvs_commit(handle) })
            })
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }
}

// ── ESP-IDF handle plumbing ───────────────────────────────────

#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> Result<std::ffi::CString, StorageError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(StorageError::IoError);
    }
    std::ffi::CString::new(name).map_err(|_| StorageError::IoError)
}

#[cfg(target_os = "espidf")]
fn check(ret: i32) -> Result<(), StorageError> {
    match ret {
        r if r == ESP_OK as i32 => Ok(()),
        r if r == ESP_ERR_NVS_NOT_FOUND as i32 => Err(StorageError::NotFound),
        r if r == ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 => Err(StorageError::Full),
        r if r == ESP_ERR_NVS_INVALID_LENGTH as i32 => Err(StorageError::Corrupt),
        _ => Err(StorageError::IoError),
    }
}

/// Open `namespace`, run `f`, and close the handle on every path.
#[cfg(target_os = "espidf")]
fn with_handle<T>(
    namespace: &str,
    write: bool,
    f: impl FnOnce(nvs_handle_t) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let ns = c_name(namespace)?;
    let mode = if write {
        nvs_open_mode_t_NVS_READWRITE
    } else {
        nvs_open_mode_t_NVS_READONLY
    };
    let mut handle: nvs_handle_t = 0;
    // SAFETY: `ns` is NUL-terminated and `handle` is a valid out-pointer.
    check(unsafe { nvs_open(ns.as_ptr(), mode, &mut handle) })?;
    let result = f(handle);
    // SAFETY: `handle` was opened above and is not used afterwards.
    unsafe { nvs_close(handle) };
    result
}

// ── Config validation ─────────────────────────────────────────

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !(60..=86_400).contains(&cfg.sample_interval_secs) {
        return Err(ConfigError::ValidationFailed(
            "sample_interval_secs must be 60..=86400",
        ));
    }
    if !(100..=10_000).contains(&cfg.tick_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "tick_interval_ms must be 100..=10000",
        ));
    }
    if !(1..=60_000).contains(&cfg.sampling_lock_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "sampling_lock_timeout_ms must be 1..=60000",
        ));
    }
    if !(1..=60_000).contains(&cfg.calibration_lock_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "calibration_lock_timeout_ms must be 1..=60000",
        ));
    }
    if cfg.settle_ms > 5_000 {
        return Err(ConfigError::ValidationFailed("settle_ms must be at most 5000"));
    }
    if !(1..=1_000).contains(&cfg.samples_per_reading) {
        return Err(ConfigError::ValidationFailed(
            "samples_per_reading must be 1..=1000",
        ));
    }
    if cfg.sample_spacing_ms > 1_000 {
        return Err(ConfigError::ValidationFailed(
            "sample_spacing_ms must be at most 1000",
        ));
    }
    if !(cfg.broker_uri.starts_with("mqtt://") || cfg.broker_uri.starts_with("mqtts://")) {
        return Err(ConfigError::ValidationFailed(
            "broker_uri must start with mqtt:// or mqtts://",
        ));
    }
    if cfg.timezone.is_empty() {
        return Err(ConfigError::ValidationFailed("timezone must not be empty"));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    /// Stored config, or defaults when nothing usable is stored.  A blob
    /// that decodes but fails validation is also replaced by defaults.
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        match self.get_blob(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(bytes) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                if let Err(e) = validate_config(&cfg) {
                    warn!("NVS: stored config rejected ({}), using defaults", e);
                    return Ok(SystemConfig::default());
                }
                info!("NVS: config loaded ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NVS: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NVS: config unreadable ({}), using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.put_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|e| match e {
                StorageError::Full => ConfigError::StorageFull,
                _ => ConfigError::IoError,
            })?;
        info!("NVS: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let blob = self.get_blob(namespace, key)?;
        let len = blob.len().min(buf.len());
        buf[..len].copy_from_slice(&blob[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put_blob(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = c_name(key)?;
            with_handle(namespace, true, |handle| {
                match check(unsafe { nvs_erase_key(handle, key.as_ptr()) }) {
                    Ok(()) | Err(StorageError::NotFound) => {}
                    Err(e) => return Err(e),
                }
                check(unsafe { nvs_commit(handle) })
            })
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let Ok(key) = c_name(key) else {
                return false;
            };
            with_handle(namespace, false, |handle| {
                check(unsafe { nvs_find_key(handle, key.as_ptr(), core::ptr::null_mut()) })
            })
            .is_ok()
        }
    }
}

impl Default for NvsAdapter {
    /// Unpersisted adapter for when flash init failed.
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::unbacked())
    }
}
