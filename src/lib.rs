//! AquaSense firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod calibration;
pub mod config;
pub mod converter;
pub mod error;
pub mod pins;
pub mod sensors;

// Hardware-facing modules; the ESP-IDF implementations are guarded by cfg
// attributes inside and each has a simulation counterpart.
pub mod adapters;
pub mod drivers;
