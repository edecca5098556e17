//! MQTT adapter (ESP-IDF only).
//!
//! - Outbound: [`MqttPublisher`] implements [`Publisher`] over a shared
//!   `EspMqttClient`.
//! - Inbound: a receiver thread drains the `EspMqttConnection`, hands every
//!   complete message to the [`CommandRouter`], and on each (re)connect
//!   re-subscribes and publishes the online status.
//!
//! The broker holds `{"status":"0",...}` as last-will on the status topic
//! so an unexpected disconnect marks the device offline.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use embedded_svc::mqtt::client::{Details, EventPayload, QoS};
use esp_idf_svc::mqtt::client::{
    EspMqttClient, EspMqttConnection, LwtConfiguration, MqttClientConfiguration,
};
use esp_idf_svc::sys::EspError;
use log::{info, warn};

use crate::adapters::log_sink::LogEventSink;
use crate::app::commands::CommandRouter;
use crate::app::ports::{PublishError, Publisher};
use crate::app::telemetry::{Topic, TopicSet, render_status};
use crate::drivers::task_pin::{Core, spawn_on_core};

const MAX_PAYLOAD_BYTES: usize = 512;
const RX_STACK_KB: usize = 8;
const RX_PRIORITY: u8 = 5;

#[derive(Debug)]
pub enum MqttStartError {
    /// The ESP-IDF client could not be created.
    Client(EspError),
    /// The receiver task could not be spawned.
    Receiver(io::Error),
}

impl fmt::Display for MqttStartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(e) => write!(f, "mqtt client: {e}"),
            Self::Receiver(e) => write!(f, "mqtt receiver: {e}"),
        }
    }
}

impl std::error::Error for MqttStartError {}

type SharedClient = Arc<Mutex<EspMqttClient<'static>>>;

/// Publishes readings; refuses while the broker session is down.
pub struct MqttPublisher {
    client: SharedClient,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        client
            .enqueue(topic, QoS::AtLeastOnce, false, payload.as_bytes())
            .map(|_| ())
            .map_err(|e| {
                warn!("mqtt: publish to {} failed: {:?}", topic, e);
                PublishError::Rejected
            })
    }
}

/// Connect to `broker_uri` and start the receiver thread.
pub fn start(
    broker_uri: &str,
    client_id: &str,
    topics: &TopicSet,
    router: CommandRouter,
    firmware_version: &'static str,
) -> Result<MqttPublisher, MqttStartError> {
    let status_topic = topics.status();
    let offline = render_status(false, firmware_version).unwrap_or_default();
    let conf = MqttClientConfiguration {
        client_id: Some(client_id),
        lwt: Some(LwtConfiguration {
            topic: &status_topic,
            payload: offline.as_bytes(),
            qos: QoS::AtLeastOnce,
            retain: true,
        }),
        ..Default::default()
    };

    let (client, conn) = EspMqttClient::new(broker_uri, &conf).map_err(MqttStartError::Client)?;
    info!("mqtt: client started for {}", broker_uri);

    let client = Arc::new(Mutex::new(client));
    let connected = Arc::new(AtomicBool::new(false));

    let rx = Receiver {
        client: Arc::clone(&client),
        connected: Arc::clone(&connected),
        router,
        status_topic,
        firmware_version,
    };
    spawn_on_core(Core::Pro, RX_PRIORITY, RX_STACK_KB, "mqtt-rx\0", move || rx.run(conn))
        .map_err(MqttStartError::Receiver)?;

    Ok(MqttPublisher { client, connected })
}

struct Receiver {
    client: SharedClient,
    connected: Arc<AtomicBool>,
    router: CommandRouter,
    status_topic: Topic,
    firmware_version: &'static str,
}

impl Receiver {
    fn run(self, mut conn: EspMqttConnection) {
        let mut sink = LogEventSink::new();
        while let Ok(event) = conn.next() {
            match event.payload() {
                EventPayload::Connected(_) => {
                    info!("mqtt: connected");
                    self.on_connected();
                    self.connected.store(true, Ordering::Release);
                }
                EventPayload::Disconnected => {
                    warn!("mqtt: disconnected");
                    self.connected.store(false, Ordering::Release);
                }
                EventPayload::Received {
                    topic: Some(topic),
                    data,
                    details: Details::Complete,
                    ..
                } => {
                    if data.len() > MAX_PAYLOAD_BYTES {
                        warn!("mqtt: dropping {} byte payload on {}", data.len(), topic);
                        continue;
                    }
                    let _ = self.router.handle_message(topic, data, &mut sink);
                }
                EventPayload::Error(e) => warn!("mqtt: {:?}", e),
                _ => {}
            }
        }
        self.connected.store(false, Ordering::Release);
        info!("mqtt: connection closed, receiver exiting");
    }

    fn on_connected(&self) {
        let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        for topic in self.router.subscriptions() {
            if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce) {
                warn!("mqtt: subscribe {} failed: {:?}", topic, e);
            }
        }
        match render_status(true, self.firmware_version) {
            Ok(online) => {
                if let Err(e) =
                    client.enqueue(&self.status_topic, QoS::AtLeastOnce, true, online.as_bytes())
                {
                    warn!("mqtt: status publish failed: {:?}", e);
                }
            }
            Err(e) => warn!("mqtt: cannot encode status: {}", e),
        }
    }
}
