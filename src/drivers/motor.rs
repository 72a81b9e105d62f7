use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;

use mip_balance::hal::{duty_to_compare, Motors, Wheel};

const LEFT_CHANNEL: Channel = Channel::Ch3;
const RIGHT_CHANNEL: Channel = Channel::Ch4;

/// Dual H-bridge driven as PWM + DIR per wheel, with a shared standby pin.
pub struct HBridgeMotors {
    pwm: SimplePwm<'static, TIM3>,
    dir_left: Output<'static, AnyPin>,
    dir_right: Output<'static, AnyPin>,
    standby: Output<'static, AnyPin>,
    max_compare: u16,
    enabled: bool,
}

impl HBridgeMotors {
    /// Starts with the bridge in standby and both channels off.
    pub fn new(
        pwm: SimplePwm<'static, TIM3>,
        dir_left: Output<'static, AnyPin>,
        dir_right: Output<'static, AnyPin>,
        standby: Output<'static, AnyPin>,
    ) -> Self {
        let max_compare = pwm.get_max_duty();
        let mut motors = Self {
            pwm,
            dir_left,
            dir_right,
            standby,
            max_compare,
            enabled: false,
        };
        motors.disable_all();
        motors
    }
}

impl Motors for HBridgeMotors {
    fn set_duty(&mut self, wheel: Wheel, duty: f32) {
        if !self.enabled {
            return;
        }

        let (reverse, compare) = duty_to_compare(duty, self.max_compare);
        let (channel, dir) = match wheel {
            Wheel::Left => (LEFT_CHANNEL, &mut self.dir_left),
            Wheel::Right => (RIGHT_CHANNEL, &mut self.dir_right),
        };

        if reverse {
            dir.set_high();
        } else {
            dir.set_low();
        }
        self.pwm.set_duty(channel, compare);
    }

    fn enable_all(&mut self) {
        self.pwm.set_duty(LEFT_CHANNEL, 0);
        self.pwm.set_duty(RIGHT_CHANNEL, 0);
        self.pwm.enable(LEFT_CHANNEL);
        self.pwm.enable(RIGHT_CHANNEL);
        self.standby.set_high();
        self.enabled = true;
    }

    fn disable_all(&mut self) {
        self.enabled = false;
        self.standby.set_low();
        self.pwm.set_duty(LEFT_CHANNEL, 0);
        self.pwm.set_duty(RIGHT_CHANNEL, 0);
        self.pwm.disable(LEFT_CHANNEL);
        self.pwm.disable(RIGHT_CHANNEL);
    }
}
