use embassy_stm32::peripherals::{TIM4, TIM8};
use embassy_stm32::timer::qei::Qei;

use mip_balance::hal::{EncoderCounter, Encoders, Wheel};

/// Both wheel encoders on hardware quadrature timers.
///
/// The timers count in 16 bits; [`EncoderCounter`] extends that to a
/// signed position each time it is read.
pub struct WheelEncoders {
    left: Qei<'static, TIM4>,
    right: Qei<'static, TIM8>,
    left_count: EncoderCounter,
    right_count: EncoderCounter,
}

impl WheelEncoders {
    pub fn new(left: Qei<'static, TIM4>, right: Qei<'static, TIM8>) -> Self {
        let left_count = EncoderCounter::new(left.count());
        let right_count = EncoderCounter::new(right.count());
        Self {
            left,
            right,
            left_count,
            right_count,
        }
    }
}

impl Encoders for WheelEncoders {
    fn read_position(&mut self, wheel: Wheel) -> i32 {
        match wheel {
            Wheel::Left => self.left_count.update(self.left.count()),
            Wheel::Right => self.right_count.update(self.right.count()),
        }
    }

    fn reset_position(&mut self, wheel: Wheel) {
        match wheel {
            Wheel::Left => self.left_count.zero(self.left.count()),
            Wheel::Right => self.right_count.zero(self.right.count()),
        }
    }
}
