use embassy_stm32::adc::{Adc, SampleTime};
use embassy_stm32::peripherals::{ADC1, PC2};

/// 12-bit ADC full scale
const ADC_FULL_SCALE: f32 = 4095.0;
const ADC_VREF: f32 = 3.3;
/// 10k / 1k divider on the board's VBAT sense line
const DIVIDER_RATIO: f32 = 11.0;

/// Pack voltage through the VBAT sense divider.
pub struct BatteryMonitor {
    adc: Adc<'static, ADC1>,
    pin: PC2,
}

impl BatteryMonitor {
    pub fn new(mut adc: Adc<'static, ADC1>, pin: PC2) -> Self {
        adc.set_sample_time(SampleTime::Cycles480);
        Self { adc, pin }
    }

    pub fn read_volts(&mut self) -> f32 {
        let raw = self.adc.read(&mut self.pin);
        raw as f32 / ADC_FULL_SCALE * ADC_VREF * DIVIDER_RATIO
    }
}
