//! Fuzz target: `parse_command`
//!
//! The first byte picks a command suffix, the rest is the MQTT payload.
//! Parsing must never panic, and any accepted calibration value or URL
//! must satisfy the same checks the mailbox relies on.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use aquasense::app::commands::{Command, CommandKind, parse_command};
use libfuzzer_sys::fuzz_target;

const DEVICE: &str = "AA:BB:CC:DD:EE:FF";

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let kind = CommandKind::ALL[usize::from(selector) % CommandKind::ALL.len()];
    let topic = format!("devices/{}/{}", DEVICE, kind.topic_suffix());

    match parse_command(&topic, payload, DEVICE) {
        Ok(Command::PhCalibration(v)) | Ok(Command::TdsCalibration(v)) => {
            assert!(v.is_finite(), "non-finite reference accepted");
        }
        Ok(Command::FirmwareUpdate(url)) => {
            assert!(!url.is_empty(), "empty URL accepted");
            assert_eq!(url.as_str(), url.trim(), "URL not trimmed");
        }
        Ok(cmd) => assert_eq!(cmd.kind(), kind),
        Err(_) => {}
    }
});
