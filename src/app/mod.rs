//! Application core: sampling, command handling and update policy.
//!
//! Everything here talks to hardware and the network through the port
//! traits in [`ports`] and the [`ConverterHal`](crate::converter::ConverterHal),
//! so the whole layer runs on the host in tests.

pub mod commands;
pub mod coordinator;
pub mod events;
pub mod ota;
pub mod ports;
pub mod telemetry;
