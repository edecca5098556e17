//! Outbound message shapes.
//!
//! Readings go to `sensors/<id>/<quantity>` as
//! `{"timestamp":"YYYY-MM-DDTHH:MM:SS","<quantity>":value}`; turbidity is an
//! integer percent, every other quantity is rounded to two decimals.
//! Status goes to `devices/<id>/status`.

use core::fmt::Write;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// MAC-derived identifier, `AA:BB:CC:DD:EE:FF`.
pub type DeviceId = heapless::String<24>;

/// Topic buffer large enough for every inbound and outbound topic.
pub type Topic = heapless::String<64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Turbidity,
    Tds,
    Ph,
    Temperature,
}

impl Quantity {
    /// Publish order within one cycle.
    pub const ALL: [Self; 4] = [Self::Turbidity, Self::Tds, Self::Ph, Self::Temperature];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Turbidity => "turbidity",
            Self::Tds => "tds",
            Self::Ph => "ph",
            Self::Temperature => "temperature",
        }
    }
}

/// Value as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue {
    Integer(i32),
    Decimal(f32),
}

impl WireValue {
    pub fn for_quantity(quantity: Quantity, value: f32) -> Self {
        match quantity {
            // Truncated toward zero.
            Quantity::Turbidity => Self::Integer(value as i32),
            _ => Self::Decimal(round2(value)),
        }
    }
}

fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

struct ReadingPayload<'a> {
    timestamp: &'a str,
    quantity: Quantity,
    value: WireValue,
}

impl Serialize for ReadingPayload<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("timestamp", self.timestamp)?;
        match self.value {
            WireValue::Integer(v) => map.serialize_entry(self.quantity.name(), &v)?,
            WireValue::Decimal(v) => map.serialize_entry(self.quantity.name(), &v)?,
        }
        map.end()
    }
}

#[derive(Serialize)]
struct StatusPayload<'a> {
    status: &'a str,
    firmware_version: &'a str,
}

/// Topics for one device.
#[derive(Debug, Clone)]
pub struct TopicSet {
    device_id: DeviceId,
}

impl TopicSet {
    pub fn new(device_id: DeviceId) -> Self {
        Self { device_id }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn reading(&self, quantity: Quantity) -> Topic {
        let mut t = Topic::new();
        let _ = write!(t, "sensors/{}/{}", self.device_id, quantity.name());
        t
    }

    pub fn status(&self) -> Topic {
        let mut t = Topic::new();
        let _ = write!(t, "devices/{}/status", self.device_id);
        t
    }
}

pub fn render_reading(
    quantity: Quantity,
    value: f32,
    timestamp: &str,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ReadingPayload {
        timestamp,
        quantity,
        value: WireValue::for_quantity(quantity, value),
    })
}

/// `online` true on connect, false for the last-will message.
pub fn render_status(online: bool, firmware_version: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&StatusPayload {
        status: if online { "1" } else { "0" },
        firmware_version,
    })
}
