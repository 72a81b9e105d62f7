//! Collaborator contracts between the control core and the board drivers.
//!
//! The control loops only see these traits; the firmware implements them on
//! top of embassy-stm32 peripherals and the tests implement them with
//! recording mocks.

/// One IMU reading in the robot body frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuSample {
    /// Specific force, m/s²
    pub accel: [f32; 3],
    /// Angular rate, deg/s
    pub gyro: [f32; 3],
}

/// How the IMU is mounted relative to the body frame.
///
/// The estimator expects Y up and X along the wheel axle when the robot
/// stands upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Orientation {
    /// Board stands vertically, sensor axes already match the body frame.
    YUp,
    /// Board lies flat with its Z axis pointing up.
    ZUp,
}

impl Orientation {
    /// Rotate a sensor-frame vector into the body frame.
    pub fn remap(self, v: [f32; 3]) -> [f32; 3] {
        match self {
            Self::YUp => v,
            Self::ZUp => [v[0], v[2], -v[1]],
        }
    }

    pub fn remap_sample(self, sample: ImuSample) -> ImuSample {
        ImuSample {
            accel: self.remap(sample.accel),
            gyro: self.remap(sample.gyro),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wheel {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedColor {
    Red,
    Green,
}

pub trait Encoders {
    /// Accumulated count since the last reset.
    fn read_position(&mut self, wheel: Wheel) -> i32;
    fn reset_position(&mut self, wheel: Wheel);
}

pub trait Motors {
    /// Signed duty cycle in [-1, 1]. Ignored while outputs are disabled.
    fn set_duty(&mut self, wheel: Wheel, duty: f32);
    fn enable_all(&mut self);
    fn disable_all(&mut self);
}

pub trait StatusLed {
    fn set(&mut self, color: LedColor, on: bool);
}

// ── Driver helpers ────────────────────────────────────────────────────────────

/// Extends a wrapping 16-bit quadrature counter to a signed 32-bit position.
///
/// Must be fed at least once per half counter range of travel; at 100 Hz
/// that is far beyond what the wheels can do.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderCounter {
    last_raw: u16,
    position: i32,
}

impl EncoderCounter {
    pub const fn new(raw: u16) -> Self {
        Self {
            last_raw: raw,
            position: 0,
        }
    }

    pub fn update(&mut self, raw: u16) -> i32 {
        let delta = raw.wrapping_sub(self.last_raw) as i16;
        self.last_raw = raw;
        self.position = self.position.wrapping_add(delta as i32);
        self.position
    }

    /// Make the current hardware count the new zero.
    pub fn zero(&mut self, raw: u16) {
        self.last_raw = raw;
        self.position = 0;
    }
}

/// Split a signed duty into (reverse, compare value) for a PWM + DIR bridge.
pub fn duty_to_compare(duty: f32, max_compare: u16) -> (bool, u16) {
    let duty = duty.clamp(-1.0, 1.0);
    let magnitude = if duty < 0.0 { -duty } else { duty };
    (duty < 0.0, (magnitude * max_compare as f32) as u16)
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording doubles for the collaborator traits.

    use super::*;

    #[derive(Default)]
    pub struct MockEncoders {
        pub left: i32,
        pub right: i32,
        pub resets: u32,
    }

    impl Encoders for MockEncoders {
        fn read_position(&mut self, wheel: Wheel) -> i32 {
            match wheel {
                Wheel::Left => self.left,
                Wheel::Right => self.right,
            }
        }

        fn reset_position(&mut self, wheel: Wheel) {
            self.resets += 1;
            match wheel {
                Wheel::Left => self.left = 0,
                Wheel::Right => self.right = 0,
            }
        }
    }

    #[derive(Default)]
    pub struct MockMotors {
        pub enabled: bool,
        pub left: f32,
        pub right: f32,
        pub writes: u32,
        pub disable_calls: u32,
    }

    impl Motors for MockMotors {
        fn set_duty(&mut self, wheel: Wheel, duty: f32) {
            self.writes += 1;
            match wheel {
                Wheel::Left => self.left = duty,
                Wheel::Right => self.right = duty,
            }
        }

        fn enable_all(&mut self) {
            self.enabled = true;
        }

        fn disable_all(&mut self) {
            self.enabled = false;
            self.disable_calls += 1;
        }
    }

    #[derive(Default)]
    pub struct MockLed {
        pub red: bool,
        pub green: bool,
    }

    impl StatusLed for MockLed {
        fn set(&mut self, color: LedColor, on: bool) {
            match color {
                LedColor::Red => self.red = on,
                LedColor::Green => self.green = on,
            }
        }
    }
}
