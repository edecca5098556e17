//! Bit-banged 1-Wire bus master for the DS18B20 probe.
//!
//! Timing follows the Maxim application note 126 "standard speed" slots.
//! Each time slot runs with interrupts masked so the Wi-Fi task cannot
//! stretch it; the long reset pulse does not.
//!
//! The CRC and scratchpad decoding are target-independent and tested on
//! the host.

use crate::error::SensorError;

pub const CMD_SKIP_ROM: u8 = 0xCC;
pub const CMD_CONVERT_T: u8 = 0x44;
pub const CMD_READ_SCRATCHPAD: u8 = 0xBE;

/// Scratchpad value at power-on, before any conversion completed.
const POWER_ON_RESET_RAW: i16 = 0x0550;

/// Dallas/Maxim CRC-8 (polynomial x⁸ + x⁵ + x⁴ + 1, reflected 0x8C).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
    }
    crc
}

/// Validate a 9-byte scratchpad and return the temperature in °C
/// (12-bit resolution, 1/16 °C per LSB).
pub fn decode_scratchpad(scratchpad: &[u8; 9]) -> Result<f32, SensorError> {
    if scratchpad.iter().all(|&b| b == 0xFF) {
        // Bus floated high for every bit: nothing answered.
        return Err(SensorError::NoDevice);
    }
    if crc8(&scratchpad[..8]) != scratchpad[8] {
        return Err(SensorError::CrcMismatch);
    }
    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    if raw == POWER_ON_RESET_RAW {
        return Err(SensorError::OutOfRange);
    }
    let celsius = f32::from(raw) / 16.0;
    if !(-55.0..=125.0).contains(&celsius) {
        return Err(SensorError::OutOfRange);
    }
    Ok(celsius)
}

#[cfg(target_os = "espidf")]
pub use bus::OneWireBus;

#[cfg(target_os = "espidf")]
mod bus {
    use esp_idf_svc::sys::*;

    use crate::error::SensorError;

    /// Open-drain data line with an external pull-up.
    pub struct OneWireBus {
        pin: i32,
    }

    impl OneWireBus {
        pub fn new(pin: i32) -> Self {
            // SAFETY: single pin owned by this bus; configured once.
            unsafe {
                gpio_reset_pin(pin);
                gpio_set_direction(pin, gpio_mode_t_GPIO_MODE_INPUT_OUTPUT_OD);
                gpio_set_level(pin, 1);
            }
            Self { pin }
        }

        /// Reset pulse + presence detect.
        pub fn reset(&mut self) -> Result<(), SensorError> {
            // SAFETY: register access on the pin configured in `new`.
            let present = unsafe {
                gpio_set_level(self.pin, 0);
                esp_rom_delay_us(480);
                gpio_set_level(self.pin, 1);
                esp_rom_delay_us(70);
                let level = gpio_get_level(self.pin);
                esp_rom_delay_us(410);
                level == 0
            };
            if present { Ok(()) } else { Err(SensorError::NoDevice) }
        }

        pub fn write_byte(&mut self, byte: u8) {
            for i in 0..8 {
                self.write_bit(byte & (1 << i) != 0);
            }
        }

        pub fn read_byte(&mut self) -> u8 {
            let mut byte = 0u8;
            for i in 0..8 {
                if self.read_bit() {
                    byte |= 1 << i;
                }
            }
            byte
        }

        fn write_bit(&mut self, bit: bool) {
            let (low_us, high_us) = if bit { (6, 64) } else { (60, 10) };
            let pin = self.pin;
            // SAFETY: register access on the pin configured in `new`.
            esp_idf_hal::interrupt::free(|| unsafe {
                gpio_set_level(pin, 0);
                esp_rom_delay_us(low_us);
                gpio_set_level(pin, 1);
            });
            unsafe { esp_rom_delay_us(high_us) };
        }

        fn read_bit(&mut self) -> bool {
            let pin = self.pin;
            // SAFETY: register access on the pin configured in `new`.
            let level = esp_idf_hal::interrupt::free(|| unsafe {
                gpio_set_level(pin, 0);
                esp_rom_delay_us(6);
                gpio_set_level(pin, 1);
                esp_rom_delay_us(9);
                gpio_get_level(pin)
            });
            unsafe { esp_rom_delay_us(55) };
            level != 0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_crc(mut bytes: [u8; 9]) -> [u8; 9] {
        bytes[8] = crc8(&bytes[..8]);
        bytes
    }

    #[test]
    fn crc_of_maxim_rom_example() {
        // ROM code from the DS18B20 datasheet CRC example.
        let rom = [0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(crc8(&rom), 0xA2);
    }

    #[test]
    fn decodes_positive_reading() {
        // +25.0625 °C = 0x0191
        let pad = with_crc([0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10, 0]);
        assert!((decode_scratchpad(&pad).unwrap() - 25.0625).abs() < 1e-4);
    }

    #[test]
    fn decodes_negative_reading() {
        // -10.125 °C = 0xFF5E
        let pad = with_crc([0x5E, 0xFF, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10, 0]);
        assert!((decode_scratchpad(&pad).unwrap() + 10.125).abs() < 1e-4);
    }

    #[test]
    fn rejects_bad_crc() {
        let mut pad = with_crc([0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10, 0]);
        pad[8] ^= 0x01;
        assert_eq!(decode_scratchpad(&pad), Err(SensorError::CrcMismatch));
    }

    #[test]
    fn rejects_power_on_value() {
        let pad = with_crc([0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10, 0]);
        assert_eq!(decode_scratchpad(&pad), Err(SensorError::OutOfRange));
    }

    #[test]
    fn floating_bus_means_no_device() {
        assert_eq!(decode_scratchpad(&[0xFF; 9]), Err(SensorError::NoDevice));
    }
}
