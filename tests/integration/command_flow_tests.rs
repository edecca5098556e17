//! Inbound command handling across router, mailbox, coordinator and the
//! firmware-update watcher.

use std::sync::Arc;

use aquasense::app::commands::CommandKind;
use aquasense::app::coordinator::TickOutcome;
use aquasense::app::events::AppEvent;
use aquasense::app::ota::OtaWatcher;
use aquasense::app::ports::{FirmwareUpdater, UpdateError};
use aquasense::error::CommandError;

use crate::mock_hw::{DEVICE, Device, EventLog};

#[derive(Default)]
struct ScriptedUpdater {
    urls: Vec<String>,
    fail_with: Option<UpdateError>,
}

impl FirmwareUpdater for ScriptedUpdater {
    fn update(&mut self, url: &str) -> Result<(), UpdateError> {
        self.urls.push(url.into());
        self.fail_with.map_or(Ok(()), Err)
    }
}

#[test]
fn malformed_messages_leave_every_latch_clear() {
    let mut dev = Device::new();
    dev.receive("ph_calibration", "seven");
    dev.receive("tds_calibration", "NaN");
    dev.receive("firmware_update", "   ");
    dev.receive("reboot", "1");

    assert!(dev.mailbox.poll().is_empty());
    assert_eq!(
        dev.events.count(|e| matches!(e, AppEvent::CommandRejected(_))),
        4
    );
    assert!(
        dev.events
            .0
            .contains(&AppEvent::CommandRejected(CommandError::EmptyUrl))
    );
}

#[test]
fn messages_for_another_device_are_ignored() {
    let mut dev = Device::new();
    let mut sink = EventLog::default();
    let result = dev
        .router
        .handle_message("devices/11:22:33:44:55:66/send_data", b"", &mut sink);

    assert_eq!(result, Err(CommandError::UnknownTopic));
    assert!(!dev.mailbox.is_latched(CommandKind::SendData));
}

#[test]
fn send_data_publishes_once_then_clears() {
    let mut dev = Device::new();
    dev.tick();
    dev.receive("send_data", "now");
    dev.receive("send_data", "again");

    assert!(matches!(dev.tick(), TickOutcome::Published(_)));
    assert_eq!(dev.tick(), TickOutcome::Idle);
    assert_eq!(dev.published("turbidity").len(), 2);
    assert_eq!(
        dev.events
            .count(|e| *e == AppEvent::CommandHandled(CommandKind::SendData)),
        1
    );
}

#[test]
fn subscriptions_cover_every_command_topic() {
    let dev = Device::new();
    let subs = dev.router.subscriptions();
    for kind in CommandKind::ALL {
        let expected = format!("devices/{}/{}", DEVICE, kind.topic_suffix());
        assert!(subs.iter().any(|t| t.as_str() == expected), "missing {}", expected);
    }
}

#[test]
fn failed_update_is_not_retried_until_a_new_url_arrives() {
    let mut dev = Device::new();
    let updater = ScriptedUpdater {
        fail_with: Some(UpdateError::HttpStatus(404)),
        ..Default::default()
    };
    let mut ota = OtaWatcher::new(Arc::clone(&dev.mailbox), updater);

    dev.receive("firmware_update", " http://updates.local/fw-0.3.1.bin \n");
    assert_eq!(
        ota.poll(&mut dev.events),
        Some(Err(UpdateError::HttpStatus(404)))
    );
    assert!(!dev.mailbox.is_latched(CommandKind::FirmwareUpdate));
    assert_eq!(ota.poll(&mut dev.events), None);

    dev.receive("firmware_update", "http://updates.local/fw-0.3.2.bin");
    ota.poll(&mut dev.events);
    assert_eq!(
        ota.updater().urls,
        [
            "http://updates.local/fw-0.3.1.bin",
            "http://updates.local/fw-0.3.2.bin"
        ]
    );
}

#[test]
fn sampling_continues_while_update_is_pending() {
    let mut dev = Device::new();
    dev.receive("firmware_update", "http://updates.local/fw.bin");
    assert!(matches!(dev.tick(), TickOutcome::Published(_)));
    assert!(dev.mailbox.is_latched(CommandKind::FirmwareUpdate));
}
