//! DS18B20 water-temperature probe on the one-wire bus.
//!
//! The probe is read outside the converter lease: it has its own data
//! line and the 750 ms conversion would otherwise hold the shared ADC.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: [`Ds18b20Probe`] powers the probe, runs a conversion over
//! the bit-banged bus and decodes the scratchpad.
//! On host/test: [`SimTemperatureProbe`] returns an injectable value.

use crate::app::ports::TemperatureProbe;
use crate::error::SensorError;

/// Compensation temperature used when the probe cannot be read.
pub const FALLBACK_CELSIUS: f32 = 25.0;

// ── Simulation probe ──────────────────────────────────────────

/// Host-side probe with a scripted reading.
#[derive(Debug, Clone)]
pub struct SimTemperatureProbe {
    reading: Result<f32, SensorError>,
    pub measurements: u32,
}

impl SimTemperatureProbe {
    pub fn new(celsius: f32) -> Self {
        Self {
            reading: Ok(celsius),
            measurements: 0,
        }
    }

    pub fn set_celsius(&mut self, celsius: f32) {
        self.reading = Ok(celsius);
    }

    pub fn set_failure(&mut self, err: SensorError) {
        self.reading = Err(err);
    }
}

impl Default for SimTemperatureProbe {
    fn default() -> Self {
        Self::new(FALLBACK_CELSIUS)
    }
}

impl TemperatureProbe for SimTemperatureProbe {
    fn measure_celsius(&mut self) -> Result<f32, SensorError> {
        self.measurements += 1;
        self.reading
    }
}

// ── DS18B20 on hardware ───────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use hw::Ds18b20Probe;

#[cfg(target_os = "espidf")]
mod hw {
    use esp_idf_hal::delay::FreeRtos;
    use log::warn;

    use crate::app::ports::TemperatureProbe;
    use crate::drivers::onewire::{
        self, OneWireBus, CMD_CONVERT_T, CMD_READ_SCRATCHPAD, CMD_SKIP_ROM,
    };
    use crate::error::SensorError;

    /// 12-bit conversion time from the datasheet.
    const CONVERSION_MS: u32 = 750;

    pub struct Ds18b20Probe {
        bus: OneWireBus,
        enable_gpio: i32,
    }

    impl Ds18b20Probe {
        pub fn new(data_gpio: i32, enable_gpio: i32) -> Self {
            Self {
                bus: OneWireBus::new(data_gpio),
                enable_gpio,
            }
        }

        fn convert_and_read(&mut self) -> Result<f32, SensorError> {
            self.bus.reset()?;
            self.bus.write_byte(CMD_SKIP_ROM);
            self.bus.write_byte(CMD_CONVERT_T);
            FreeRtos::delay_ms(CONVERSION_MS);

            self.bus.reset()?;
            self.bus.write_byte(CMD_SKIP_ROM);
            self.bus.write_byte(CMD_READ_SCRATCHPAD);
            let mut pad = [0u8; 9];
            for b in &mut pad {
                *b = self.bus.read_byte();
            }
            onewire::decode_scratchpad(&pad)
        }
    }

    impl TemperatureProbe for Ds18b20Probe {
        fn measure_celsius(&mut self) -> Result<f32, SensorError> {
            // SAFETY: enable pin configured as output by hw_init.
            unsafe { esp_idf_svc::sys::gpio_set_level(self.enable_gpio, 1) };
            FreeRtos::delay_ms(10);
            let result = self.convert_and_read();
            unsafe { esp_idf_svc::sys::gpio_set_level(self.enable_gpio, 0) };
            if let Err(e) = result {
                warn!("DS18B20: {}", e);
            }
            result
        }
    }
}
