//! Inbound commands and the latch mailbox that carries them.
//!
//! The MQTT task parses messages addressed to `devices/<id>/<suffix>` and
//! latches them in a [`CommandMailbox`].  The coordinator polls the
//! mailbox each tick; nothing is queued per message:
//!
//! | Suffix            | Latch                 | Repeat behaviour       |
//! |-------------------|-----------------------|------------------------|
//! | `firmware_update` | `ota_url`             | latest URL wins        |
//! | `send_data`       | `send_data`           | idempotent             |
//! | `ph_calibration`  | `ph_calibration`      | latest value wins      |
//! | `tds_calibration` | `tds_calibration`     | latest value wins      |
//!
//! Malformed payloads are dropped before any latch is touched.

use core::cell::RefCell;
use core::fmt::Write;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::app::telemetry::{DeviceId, Topic};
use crate::calibration::runner::CalibrationJob;
use crate::error::CommandError;

/// Firmware URL buffer, sized like the original 256-byte C string.
pub type OtaUrl = heapless::String<255>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    FirmwareUpdate,
    SendData,
    PhCalibration,
    TdsCalibration,
}

impl CommandKind {
    pub const ALL: [Self; 4] = [
        Self::FirmwareUpdate,
        Self::SendData,
        Self::PhCalibration,
        Self::TdsCalibration,
    ];

    pub const fn topic_suffix(self) -> &'static str {
        match self {
            Self::FirmwareUpdate => "firmware_update",
            Self::SendData => "send_data",
            Self::PhCalibration => "ph_calibration",
            Self::TdsCalibration => "tds_calibration",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.topic_suffix() == suffix)
    }
}

/// A parsed inbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FirmwareUpdate(OtaUrl),
    SendData,
    PhCalibration(f32),
    TdsCalibration(f32),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::FirmwareUpdate(_) => CommandKind::FirmwareUpdate,
            Self::SendData => CommandKind::SendData,
            Self::PhCalibration(_) => CommandKind::PhCalibration,
            Self::TdsCalibration(_) => CommandKind::TdsCalibration,
        }
    }
}

/// Parse a message on `topic` for the device `device_id`.
pub fn parse_command(topic: &str, payload: &[u8], device_id: &str) -> Result<Command, CommandError> {
    let kind = topic
        .strip_prefix("devices/")
        .and_then(|rest| rest.strip_prefix(device_id))
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(CommandKind::from_suffix)
        .ok_or(CommandError::UnknownTopic)?;

    if kind == CommandKind::SendData {
        return Ok(Command::SendData);
    }

    let text = core::str::from_utf8(payload)
        .map_err(|_| CommandError::InvalidUtf8)?
        .trim();

    match kind {
        CommandKind::FirmwareUpdate => {
            if text.is_empty() {
                return Err(CommandError::EmptyUrl);
            }
            let mut url = OtaUrl::new();
            url.push_str(text).map_err(|()| CommandError::UrlTooLong)?;
            Ok(Command::FirmwareUpdate(url))
        }
        CommandKind::PhCalibration => parse_reference(text).map(Command::PhCalibration),
        CommandKind::TdsCalibration => parse_reference(text).map(Command::TdsCalibration),
        CommandKind::SendData => Ok(Command::SendData),
    }
}

fn parse_reference(text: &str) -> Result<f32, CommandError> {
    text.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(CommandError::InvalidNumber)
}

// ───────────────────────────────────────────────────────────────
// Mailbox
// ───────────────────────────────────────────────────────────────

/// Snapshot of every latch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingCommands {
    pub ota_url: Option<OtaUrl>,
    pub send_data: bool,
    pub ph_calibration: Option<f32>,
    pub tds_calibration: Option<f32>,
}

impl PendingCommands {
    pub fn contains(&self, kind: CommandKind) -> bool {
        match kind {
            CommandKind::FirmwareUpdate => self.ota_url.is_some(),
            CommandKind::SendData => self.send_data,
            CommandKind::PhCalibration => self.ph_calibration.is_some(),
            CommandKind::TdsCalibration => self.tds_calibration.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !CommandKind::ALL.into_iter().any(|k| self.contains(k))
    }
}

/// Per-kind latches shared between the MQTT task and the coordinator.
pub struct CommandMailbox {
    latches: Mutex<CriticalSectionRawMutex, RefCell<PendingCommands>>,
}

impl Default for CommandMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandMailbox {
    pub fn new() -> Self {
        Self {
            latches: Mutex::new(RefCell::new(PendingCommands::default())),
        }
    }

    /// Set the latch for `command`, replacing any earlier value of the
    /// same kind.
    pub fn latch(&self, command: Command) {
        self.latches.lock(|l| {
            let mut l = l.borrow_mut();
            match command {
                Command::FirmwareUpdate(url) => l.ota_url = Some(url),
                Command::SendData => l.send_data = true,
                Command::PhCalibration(v) => l.ph_calibration = Some(v),
                Command::TdsCalibration(v) => l.tds_calibration = Some(v),
            }
        });
    }

    /// Non-destructive view of every latch.
    pub fn poll(&self) -> PendingCommands {
        self.latches.lock(|l| l.borrow().clone())
    }

    pub fn is_latched(&self, kind: CommandKind) -> bool {
        self.latches.lock(|l| l.borrow().contains(kind))
    }

    pub fn clear(&self, kind: CommandKind) {
        self.latches.lock(|l| {
            let mut l = l.borrow_mut();
            match kind {
                CommandKind::FirmwareUpdate => l.ota_url = None,
                CommandKind::SendData => l.send_data = false,
                CommandKind::PhCalibration => l.ph_calibration = None,
                CommandKind::TdsCalibration => l.tds_calibration = None,
            }
        });
    }

    pub fn take_ota_url(&self) -> Option<OtaUrl> {
        self.latches.lock(|l| l.borrow_mut().ota_url.take())
    }

    /// Read-and-clear the next calibration request; pH before TDS.
    pub fn take_calibration(&self) -> Option<CalibrationJob> {
        self.latches.lock(|l| {
            let mut l = l.borrow_mut();
            if let Some(reference) = l.ph_calibration.take() {
                return Some(CalibrationJob::Ph { reference });
            }
            l.tds_calibration
                .take()
                .map(|reference| CalibrationJob::Tds { reference })
        })
    }

    /// Put back a job the worker queue could not accept.  A value latched
    /// in the meantime is newer and stays.
    pub fn restore_calibration(&self, job: CalibrationJob) {
        self.latches.lock(|l| {
            let mut l = l.borrow_mut();
            match job {
                CalibrationJob::Ph { reference } => {
                    l.ph_calibration.get_or_insert(reference);
                }
                CalibrationJob::Tds { reference } => {
                    l.tds_calibration.get_or_insert(reference);
                }
            }
        });
    }
}

// ───────────────────────────────────────────────────────────────
// Router (MQTT task side)
// ───────────────────────────────────────────────────────────────

/// Maps inbound topics for one device onto its mailbox.
pub struct CommandRouter {
    device_id: DeviceId,
    mailbox: Arc<CommandMailbox>,
}

impl CommandRouter {
    pub fn new(device_id: DeviceId, mailbox: Arc<CommandMailbox>) -> Self {
        Self { device_id, mailbox }
    }

    /// Full inbound topic for `kind`.
    pub fn topic(&self, kind: CommandKind) -> Topic {
        let mut t = Topic::new();
        let _ = write!(t, "devices/{}/{}", self.device_id, kind.topic_suffix());
        t
    }

    /// Every topic to subscribe to.
    pub fn subscriptions(&self) -> [Topic; 4] {
        CommandKind::ALL.map(|k| self.topic(k))
    }

    /// Parse and latch one message.  Rejected messages leave every latch
    /// as it was.
    pub fn handle_message(
        &self,
        topic: &str,
        payload: &[u8],
        sink: &mut impl EventSink,
    ) -> Result<CommandKind, CommandError> {
        match parse_command(topic, payload, &self.device_id) {
            Ok(command) => {
                let kind = command.kind();
                info!("command: {} latched", kind.topic_suffix());
                self.mailbox.latch(command);
                Ok(kind)
            }
            Err(e) => {
                warn!("command: dropped message on '{}': {}", topic, e);
                sink.emit(&AppEvent::CommandRejected(e));
                Err(e)
            }
        }
    }
}
