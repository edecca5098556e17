//! Sensor subsystem: the fixed channel table and per-quantity derivation.
//!
//! Every formula here is a pure function of its inputs so it can be
//! exercised on the host; hardware access lives in the converter arbiter
//! and the one-wire probe driver.

pub mod ph;
pub mod tds;
pub mod temperature;
pub mod turbidity;

use crate::converter::{AdcInput, Attenuation};
use crate::pins;

/// Logical sensors on the probe board.  Fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    Temperature,
    Tds,
    Ph,
    Turbidity,
}

impl SensorChannel {
    pub const ALL: [Self; 4] = [Self::Temperature, Self::Tds, Self::Ph, Self::Turbidity];

    /// Supply-enable GPIO driven high around a reading burst.
    pub const fn enable_gpio(self) -> i32 {
        pins::SENSOR_ENABLE_GPIOS[self as usize]
    }

    /// ADC1 input, or `None` for the one-wire temperature probe.
    pub const fn adc_input(self) -> Option<AdcInput> {
        match self {
            Self::Temperature => None,
            Self::Tds => Some(AdcInput(pins::TDS_ADC_CHANNEL)),
            Self::Ph => Some(AdcInput(pins::PH_ADC_CHANNEL)),
            Self::Turbidity => Some(AdcInput(pins::TURBIDITY_ADC_CHANNEL)),
        }
    }

    /// All analog channels share the 12 dB range (0–2.45 V usable).
    pub const fn attenuation(self) -> Attenuation {
        Attenuation::Db12
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Tds => "tds",
            Self::Ph => "ph",
            Self::Turbidity => "turbidity",
        }
    }
}
