//! Firmware-update watcher.
//!
//! Polled from the coordinator loop.  A latched `firmware_update` URL is
//! taken (clearing the latch) and handed to the [`FirmwareUpdater`].  A
//! successful update restarts the device; a failed one is logged and the
//! request is not retried until a new URL arrives.

use std::sync::Arc;

use log::{error, info};

use crate::app::commands::{CommandKind, CommandMailbox};
use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, FirmwareUpdater, UpdateError};

pub struct OtaWatcher<U: FirmwareUpdater> {
    mailbox: Arc<CommandMailbox>,
    updater: U,
}

impl<U: FirmwareUpdater> OtaWatcher<U> {
    pub fn new(mailbox: Arc<CommandMailbox>, updater: U) -> Self {
        Self { mailbox, updater }
    }

    /// Run a pending update, if any.  `None` when nothing was latched.
    pub fn poll(&mut self, sink: &mut impl EventSink) -> Option<Result<(), UpdateError>> {
        let url = self.mailbox.take_ota_url()?;
        info!("ota: update requested from {}", url);
        sink.emit(&AppEvent::CommandHandled(CommandKind::FirmwareUpdate));

        let result = self.updater.update(&url);
        if let Err(e) = result {
            error!("ota: update from {} failed: {}", url, e);
        }
        Some(result)
    }

    pub fn updater(&self) -> &U {
        &self.updater
    }
}
