use embassy_stm32::gpio::{AnyPin, Output};

use mip_balance::hal::{LedColor, StatusLed};

/// Red/green status pair, active high.
pub struct StatusLeds {
    red: Output<'static, AnyPin>,
    green: Output<'static, AnyPin>,
}

impl StatusLeds {
    pub fn new(red: Output<'static, AnyPin>, green: Output<'static, AnyPin>) -> Self {
        Self { red, green }
    }
}

impl StatusLed for StatusLeds {
    fn set(&mut self, color: LedColor, on: bool) {
        let pin = match color {
            LedColor::Red => &mut self.red,
            LedColor::Green => &mut self.green,
        };
        if on {
            pin.set_high();
        } else {
            pin.set_low();
        }
    }
}
