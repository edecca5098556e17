//! Converter backends, bus drivers, hardware initialisation, and task
//! helpers.

pub mod adc;
pub mod hw_init;
pub mod onewire;
pub mod task_pin;
pub mod watchdog;
