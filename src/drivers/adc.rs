//! ADC1 oneshot backends for the [`ConverterArbiter`].
//!
//! - **`target_os = "espidf"`**: [`EspConverter`] drives the ESP-IDF
//!   oneshot driver and calibration schemes through raw sys calls.  The
//!   unit is created on `power_up` and deleted on `power_down`.
//! - **all other targets**: [`SimConverter`] serves scripted raw counts
//!   and records every call for host-side tests.
//!
//! [`ConverterArbiter`]: crate::converter::ConverterArbiter

#[cfg(target_os = "espidf")]
pub use esp::EspConverter;

#[cfg(not(target_os = "espidf"))]
pub use sim::SimConverter;

// ── ESP-IDF backend ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use embedded_hal::delay::DelayNs;
    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_svc::sys::*;
    use log::info;

    use crate::converter::{AdcInput, Attenuation, ConverterHal};
    use crate::error::ConverterError;
    use crate::sensors::SensorChannel;

    pub struct EspConverter {
        unit: adc_oneshot_unit_handle_t,
    }

    // SAFETY: the unit handle is only touched through `&mut self`, and the
    // arbiter's mutex serialises every access across tasks.
    unsafe impl Send for EspConverter {}

    impl EspConverter {
        pub fn new() -> Self {
            Self {
                unit: core::ptr::null_mut(),
            }
        }
    }

    impl Default for EspConverter {
        fn default() -> Self {
            Self::new()
        }
    }

    fn atten_bits(attenuation: Attenuation) -> adc_atten_t {
        match attenuation {
            Attenuation::Db0 => adc_atten_t_ADC_ATTEN_DB_0,
            Attenuation::Db2_5 => adc_atten_t_ADC_ATTEN_DB_2_5,
            Attenuation::Db6 => adc_atten_t_ADC_ATTEN_DB_6,
            Attenuation::Db12 => adc_atten_t_ADC_ATTEN_DB_12,
        }
    }

    impl ConverterHal for EspConverter {
        type Calibration = adc_cali_handle_t;

        fn power_up(&mut self) -> Result<(), ConverterError> {
            let init_cfg = adc_oneshot_unit_init_cfg_t {
                unit_id: adc_unit_t_ADC_UNIT_1,
                ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                ..Default::default()
            };
            // SAFETY: `unit` is null here; the arbiter only calls power_up
            // after a matching power_down.
            let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut self.unit) };
            if ret != ESP_OK as i32 {
                self.unit = core::ptr::null_mut();
                return Err(ConverterError::InitFailed(ret));
            }

            for channel in SensorChannel::ALL {
                let Some(input) = channel.adc_input() else {
                    continue;
                };
                let chan_cfg = adc_oneshot_chan_cfg_t {
                    atten: atten_bits(channel.attenuation()),
                    bitwidth: adc_bitwidth_t_ADC_BITWIDTH_DEFAULT,
                };
                let ret = unsafe { adc_oneshot_config_channel(self.unit, input.0, &chan_cfg) };
                if ret != ESP_OK as i32 {
                    self.power_down();
                    return Err(ConverterError::InitFailed(ret));
                }
            }
            Ok(())
        }

        fn power_down(&mut self) {
            if self.unit.is_null() {
                return;
            }
            // SAFETY: handle came from adc_oneshot_new_unit and is deleted once.
            unsafe { adc_oneshot_del_unit(self.unit) };
            self.unit = core::ptr::null_mut();
        }

        fn read_raw(&mut self, input: AdcInput) -> Result<u16, ConverterError> {
            if self.unit.is_null() {
                return Err(ConverterError::NotPowered);
            }
            let mut raw: i32 = 0;
            let ret = unsafe { adc_oneshot_read(self.unit, input.0, &mut raw) };
            if ret != ESP_OK as i32 {
                return Err(ConverterError::ReadFailed(ret));
            }
            Ok(raw.clamp(0, 4095) as u16)
        }

        #[cfg(any(esp32, esp32s2))]
        fn calibration_create(
            &mut self,
            _input: AdcInput,
            attenuation: Attenuation,
        ) -> Result<Self::Calibration, ConverterError> {
            let cfg = adc_cali_line_fitting_config_t {
                unit_id: adc_unit_t_ADC_UNIT_1,
                atten: atten_bits(attenuation),
                bitwidth: adc_bitwidth_t_ADC_BITWIDTH_DEFAULT,
                ..Default::default()
            };
            let mut handle: adc_cali_handle_t = core::ptr::null_mut();
            let ret = unsafe { adc_cali_create_scheme_line_fitting(&cfg, &mut handle) };
            if ret != ESP_OK as i32 {
                return Err(ConverterError::CalibrationUnavailable);
            }
            Ok(handle)
        }

        #[cfg(not(any(esp32, esp32s2)))]
        fn calibration_create(
            &mut self,
            input: AdcInput,
            attenuation: Attenuation,
        ) -> Result<Self::Calibration, ConverterError> {
            let cfg = adc_cali_curve_fitting_config_t {
                unit_id: adc_unit_t_ADC_UNIT_1,
                chan: input.0,
                atten: atten_bits(attenuation),
                bitwidth: adc_bitwidth_t_ADC_BITWIDTH_DEFAULT,
            };
            let mut handle: adc_cali_handle_t = core::ptr::null_mut();
            let ret = unsafe { adc_cali_create_scheme_curve_fitting(&cfg, &mut handle) };
            if ret != ESP_OK as i32 {
                return Err(ConverterError::CalibrationUnavailable);
            }
            Ok(handle)
        }

        fn calibration_raw_to_mv(
            &mut self,
            calibration: &Self::Calibration,
            raw: u16,
        ) -> Result<u32, ConverterError> {
            let mut mv: i32 = 0;
            let ret = unsafe { adc_cali_raw_to_voltage(*calibration, i32::from(raw), &mut mv) };
            if ret != ESP_OK as i32 {
                return Err(ConverterError::ReadFailed(ret));
            }
            Ok(mv.max(0) as u32)
        }

        fn calibration_delete(&mut self, calibration: Self::Calibration) {
            // SAFETY: handle came from the matching create call above.
            #[cfg(any(esp32, esp32s2))]
            unsafe {
                adc_cali_delete_scheme_line_fitting(calibration);
            }
            #[cfg(not(any(esp32, esp32s2)))]
            unsafe {
                adc_cali_delete_scheme_curve_fitting(calibration);
            }
        }

        fn set_sensor_power(&mut self, gpio: i32, on: bool) {
            // SAFETY: enable pins are configured as outputs by hw_init.
            unsafe { gpio_set_level(gpio, u32::from(on)) };
        }
    }

    impl DelayNs for EspConverter {
        fn delay_ns(&mut self, ns: u32) {
            FreeRtos.delay_ns(ns);
        }

        fn delay_ms(&mut self, ms: u32) {
            FreeRtos::delay_ms(ms);
        }
    }

    impl Drop for EspConverter {
        fn drop(&mut self) {
            self.power_down();
            info!("EspConverter: released ADC1");
        }
    }
}

// ── Simulation backend ────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use embedded_hal::delay::DelayNs;

    use crate::converter::{AdcInput, Attenuation, ConverterHal};
    use crate::error::ConverterError;
    use crate::sensors::SensorChannel;

    /// Calibrated full scale reported by the simulated scheme (mV).
    const SIM_CALIBRATED_FULL_SCALE_MV: u32 = 3100;

    /// Scripted converter.  Each ADC input returns a fixed raw count.
    #[derive(Debug, Default)]
    pub struct SimConverter {
        raw: [u16; 8],
        powered: bool,
        enabled: u64,
        ever_enabled: u64,
        delay_ns_total: u64,
        live_calibrations: u32,

        /// When false, `calibration_create` reports no scheme.
        pub calibration_available: bool,
        pub fail_power_up: bool,
        pub fail_reads: bool,

        pub power_ups: u32,
        pub power_downs: u32,
        pub reads: u32,
        pub calibrations_created: u32,
    }

    impl SimConverter {
        pub fn new() -> Self {
            Self {
                calibration_available: true,
                ..Default::default()
            }
        }

        pub fn set_raw(&mut self, channel: SensorChannel, raw: u16) {
            if let Some(AdcInput(n)) = channel.adc_input() {
                self.raw[n as usize] = raw;
            }
        }

        /// Raw count that yields `volts` through the simulated calibration.
        pub fn raw_for_volts(volts: f32) -> u16 {
            (volts * 1000.0 * 4095.0 / SIM_CALIBRATED_FULL_SCALE_MV as f32).round() as u16
        }

        pub fn is_powered(&self) -> bool {
            self.powered
        }

        pub fn delayed_ms(&self) -> u64 {
            self.delay_ns_total / 1_000_000
        }

        pub fn outstanding_calibrations(&self) -> u32 {
            self.live_calibrations
        }

        /// Bit `n` set = GPIO `n` currently driven high.
        pub fn enabled_mask(&self) -> u64 {
            self.enabled
        }

        /// Every enable pin driven high at least once.
        pub fn pins_ever_enabled(&self) -> u64 {
            self.ever_enabled
        }
    }

    impl ConverterHal for SimConverter {
        type Calibration = AdcInput;

        fn power_up(&mut self) -> Result<(), ConverterError> {
            if self.fail_power_up {
                return Err(ConverterError::InitFailed(-1));
            }
            self.powered = true;
            self.power_ups += 1;
            Ok(())
        }

        fn power_down(&mut self) {
            if self.powered {
                self.powered = false;
                self.power_downs += 1;
            }
        }

        fn read_raw(&mut self, input: AdcInput) -> Result<u16, ConverterError> {
            if !self.powered {
                return Err(ConverterError::NotPowered);
            }
            if self.fail_reads {
                return Err(ConverterError::ReadFailed(-1));
            }
            self.reads += 1;
            Ok(self.raw[input.0 as usize % self.raw.len()])
        }

        fn calibration_create(
            &mut self,
            input: AdcInput,
            _attenuation: Attenuation,
        ) -> Result<Self::Calibration, ConverterError> {
            if !self.calibration_available {
                return Err(ConverterError::CalibrationUnavailable);
            }
            self.calibrations_created += 1;
            self.live_calibrations += 1;
            Ok(input)
        }

        fn calibration_raw_to_mv(
            &mut self,
            _calibration: &Self::Calibration,
            raw: u16,
        ) -> Result<u32, ConverterError> {
            Ok(u32::from(raw) * SIM_CALIBRATED_FULL_SCALE_MV / 4095)
        }

        fn calibration_delete(&mut self, _calibration: Self::Calibration) {
            self.live_calibrations -= 1;
        }

        fn set_sensor_power(&mut self, gpio: i32, on: bool) {
            let bit = 1u64 << gpio;
            if on {
                self.enabled |= bit;
                self.ever_enabled |= bit;
            } else {
                self.enabled &= !bit;
            }
        }
    }

    impl DelayNs for SimConverter {
        fn delay_ns(&mut self, ns: u32) {
            self.delay_ns_total += u64::from(ns);
        }
    }
}
