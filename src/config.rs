//! Compile-time tuning for the eduMiP-class balancing robot.
//!
//! Controller coefficients come from a continuous design discretized at the
//! loop rates below; changing `SAMPLE_RATE_HZ` or `OUTER_RATE_HZ` requires
//! regenerating them.

use crate::hal::Orientation;

// ── Timing ────────────────────────────────────────────────────────────────────

/// Inner loop (D1) rate, driven by IMU data-ready
pub const SAMPLE_RATE_HZ: u32 = 100;
/// Outer loop (D2) rate
pub const OUTER_RATE_HZ: u32 = 20;

// ── Mechanics ────────────────────────────────────────────────────────────────

pub const GEAR_RATIO: f32 = 35.577;
/// Encoder counts per motor shaft revolution
pub const ENCODER_RESOLUTION: f32 = 60.0;

// ── Wiring polarity ──────────────────────────────────────────────────────────

pub const MOTOR_POLARITY_LEFT: f32 = 1.0;
pub const MOTOR_POLARITY_RIGHT: f32 = -1.0;
pub const ENCODER_POLARITY_LEFT: f32 = 1.0;
pub const ENCODER_POLARITY_RIGHT: f32 = -1.0;

// ── Safety ───────────────────────────────────────────────────────────────────

/// Lean beyond which the robot is considered fallen (rad)
pub const TIP_ANGLE_RAD: f32 = 0.8;
/// Lean below which a disarmed robot re-arms (rad)
pub const ARM_ANGLE_RAD: f32 = 0.3;
/// Continuous D1 saturation tolerated before stall cutoff (s)
pub const STALL_SECONDS: f32 = 0.5;
/// Estimator warm-up before arming is allowed (s), five filter time constants
pub const ESTIMATOR_SETTLE_S: f32 = 0.5;

// ── Angle estimator (tau = 0.1 s at 100 Hz) ──────────────────────────────────

pub const LOW_PASS_NUM: [f32; 2] = [0.04766, 0.04766];
pub const LOW_PASS_DEN: [f32; 2] = [1.0, -0.9047];
pub const HIGH_PASS_NUM: [f32; 2] = [0.9524, -0.9524];
pub const HIGH_PASS_DEN: [f32; 2] = [1.0, -0.9048];

// ── D1: body angle → motor duty ──────────────────────────────────────────────

pub const D1_NUM: [f32; 3] = [-51.19, 86.68, -36.69];
pub const D1_DEN: [f32; 3] = [1.0, -0.4895, -0.5105];
pub const D1_GAIN: f32 = 1.0;
pub const D1_DUTY_LIMIT: f32 = 1.0;
pub const D1_SOFT_START_S: f32 = 0.6;

// ── D2: wheel position → lean setpoint ───────────────────────────────────────

pub const D2_NUM: [f32; 2] = [0.1018, -0.1008];
pub const D2_DEN: [f32; 2] = [1.0, -0.621];
pub const D2_GAIN: f32 = 1.0;
/// Largest lean the outer loop may command (rad)
pub const THETA_REF_MAX: f32 = 0.4;

/// Per-wheel sign conventions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelWiring {
    pub motor_polarity: f32,
    pub encoder_polarity: f32,
}

/// Numerator/denominator pair plus gain for one controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerTuning<const N: usize> {
    pub num: [f32; N],
    pub den: [f32; N],
    pub gain: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceConfig {
    pub sample_rate_hz: u32,
    pub outer_rate_hz: u32,
    pub orientation: Orientation,
    pub gear_ratio: f32,
    pub encoder_resolution: f32,
    pub left: WheelWiring,
    pub right: WheelWiring,
    pub tip_angle_rad: f32,
    pub arm_angle_rad: f32,
    pub stall_seconds: f32,
    pub estimator_settle_s: f32,
    pub d1: ControllerTuning<3>,
    pub d1_duty_limit: f32,
    pub d1_soft_start_s: f32,
    pub d2: ControllerTuning<2>,
    pub theta_ref_max: f32,
}

impl BalanceConfig {
    /// Inner loop period in seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.sample_rate_hz as f32
    }

    /// Outer loop period in seconds.
    pub fn outer_dt(&self) -> f32 {
        1.0 / self.outer_rate_hz as f32
    }

    /// Consecutive saturated inner ticks tolerated before stall cutoff.
    pub fn stall_limit_ticks(&self) -> u32 {
        (self.sample_rate_hz as f32 * self.stall_seconds) as u32
    }

    /// Inner ticks before the estimator output is trusted for arming.
    pub fn estimator_settle_ticks(&self) -> u32 {
        (self.sample_rate_hz as f32 * self.estimator_settle_s) as u32
    }

    /// Wheel angle in radians for a raw encoder count.
    pub fn wheel_angle(&self, count: i32, wiring: &WheelWiring) -> f32 {
        count as f32 * core::f32::consts::TAU
            / (wiring.encoder_polarity * self.gear_ratio * self.encoder_resolution)
    }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            outer_rate_hz: OUTER_RATE_HZ,
            orientation: Orientation::YUp,
            gear_ratio: GEAR_RATIO,
            encoder_resolution: ENCODER_RESOLUTION,
            left: WheelWiring {
                motor_polarity: MOTOR_POLARITY_LEFT,
                encoder_polarity: ENCODER_POLARITY_LEFT,
            },
            right: WheelWiring {
                motor_polarity: MOTOR_POLARITY_RIGHT,
                encoder_polarity: ENCODER_POLARITY_RIGHT,
            },
            tip_angle_rad: TIP_ANGLE_RAD,
            arm_angle_rad: ARM_ANGLE_RAD,
            stall_seconds: STALL_SECONDS,
            estimator_settle_s: ESTIMATOR_SETTLE_S,
            d1: ControllerTuning {
                num: D1_NUM,
                den: D1_DEN,
                gain: D1_GAIN,
            },
            d1_duty_limit: D1_DUTY_LIMIT,
            d1_soft_start_s: D1_SOFT_START_S,
            d2: ControllerTuning {
                num: D2_NUM,
                den: D2_DEN,
                gain: D2_GAIN,
            },
            theta_ref_max: THETA_REF_MAX,
        }
    }
}
