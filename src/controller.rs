//! Cascaded balance control.
//!
//! D1 (inner, every IMU sample) turns lean error into motor duty. D2 (outer,
//! 20 Hz) turns wheel position error into the lean setpoint D1 tracks.

use crate::config::BalanceConfig;
use crate::error::FilterError;
use crate::estimator::AngleEstimator;
use crate::filter::DigitalFilter;
use crate::hal::{Encoders, ImuSample, LedColor, Motors, StatusLed, Wheel};
use crate::safety::{DisarmReason, SafetyDecision, SafetyMonitor};
use crate::state::SharedState;
use crate::{log_info, log_warn};

/// What one inner-loop tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Shutdown requested; motors forced off.
    Exiting,
    /// Disarmed, estimation only.
    Idle,
    /// Transitioned to armed this tick.
    Armed,
    /// Transitioned to disarmed this tick.
    Disarmed(DisarmReason),
    /// D1 ran and both motors were driven.
    Actuated { duty: f32 },
}

// ── Inner loop (D1) ──────────────────────────────────────────────────────────

pub struct InnerLoop<E, M, L> {
    config: BalanceConfig,
    estimator: AngleEstimator,
    d1: DigitalFilter<3>,
    safety: SafetyMonitor,
    encoders: E,
    motors: M,
    led: L,
    phi_announced: bool,
    /// Ticks left before arming is allowed
    settle_remaining: u32,
}

impl<E, M, L> InnerLoop<E, M, L>
where
    E: Encoders,
    M: Motors,
    L: StatusLed,
{
    pub fn new(
        config: &BalanceConfig,
        encoders: E,
        motors: M,
        mut led: L,
    ) -> Result<Self, FilterError> {
        let dt = config.dt();
        let mut d1 = DigitalFilter::new(dt, config.d1.num, config.d1.den)?.with_gain(config.d1.gain);
        d1.set_saturation(-config.d1_duty_limit, config.d1_duty_limit)?;
        d1.set_soft_start(config.d1_soft_start_s)?;

        led.set(LedColor::Red, true);
        led.set(LedColor::Green, false);

        Ok(Self {
            config: *config,
            estimator: AngleEstimator::new(dt)?,
            d1,
            safety: SafetyMonitor::new(config),
            encoders,
            motors,
            led,
            phi_announced: false,
            settle_remaining: config.estimator_settle_ticks(),
        })
    }

    /// Run one control tick for a fresh IMU sample.
    pub fn tick(&mut self, sample: &ImuSample, shared: &SharedState) -> TickOutcome {
        // ── A. Estimation (always runs) ───────────────────────────────────────
        let theta = self.estimator.update(sample);
        let wheel_left = self.wheel_angle(Wheel::Left);
        let wheel_right = self.wheel_angle(Wheel::Right);
        let phi = (wheel_left + wheel_right) / 2.0 + theta;
        shared.publish_estimate(wheel_left, wheel_right, theta, phi);

        if !self.phi_announced && phi != 0.0 {
            shared.announce_phi();
            self.phi_announced = true;
        }

        // ── B. Safety gate ────────────────────────────────────────────────────
        let decision = match self.safety.evaluate(theta, shared.run_state()) {
            // Filters start from zero, so theta reads upright until they settle
            SafetyDecision::Arm if self.settle_remaining > 0 => SafetyDecision::Hold,
            decision => decision,
        };
        self.settle_remaining = self.settle_remaining.saturating_sub(1);

        match decision {
            SafetyDecision::Exit => {
                self.motors.disable_all();
                return TickOutcome::Exiting;
            }
            SafetyDecision::Hold => return TickOutcome::Idle,
            SafetyDecision::Arm => {
                self.arm(shared);
                return TickOutcome::Armed;
            }
            SafetyDecision::Disarm(reason) => {
                self.disarm(reason, shared);
                return TickOutcome::Disarmed(reason);
            }
            SafetyDecision::Run => {}
        }

        // ── C. D1 ─────────────────────────────────────────────────────────────
        let setpoint = shared.setpoint();
        let duty = self.d1.step(setpoint.theta - theta);
        shared.set_d1_u(duty);

        if let Some(reason) = self.safety.record_saturation(self.d1.is_saturated()) {
            self.disarm(reason, shared);
            return TickOutcome::Disarmed(reason);
        }

        // Balancing is symmetric: same command to both wheels, wiring sign only
        self.motors
            .set_duty(Wheel::Left, self.config.left.motor_polarity * duty);
        self.motors
            .set_duty(Wheel::Right, self.config.right.motor_polarity * duty);

        TickOutcome::Actuated { duty }
    }

    fn wheel_angle(&mut self, wheel: Wheel) -> f32 {
        let count = self.encoders.read_position(wheel);
        let wiring = match wheel {
            Wheel::Left => &self.config.left,
            Wheel::Right => &self.config.right,
        };
        self.config.wheel_angle(count, wiring)
    }

    fn arm(&mut self, shared: &SharedState) {
        self.safety.arm();
        // Current wheel position becomes the new zero
        self.encoders.reset_position(Wheel::Left);
        self.encoders.reset_position(Wheel::Right);
        shared.reset_cascade(self.estimator.theta());
        self.d1.reset();
        self.motors.enable_all();
        self.led.set(LedColor::Red, false);
        self.led.set(LedColor::Green, true);
        shared.set_arm_state(self.safety.state());
        log_info!("armed");
    }

    fn disarm(&mut self, reason: DisarmReason, shared: &SharedState) {
        self.safety.disarm();
        self.motors.disable_all();
        self.led.set(LedColor::Green, false);
        self.led.set(LedColor::Red, true);
        shared.set_arm_state(self.safety.state());
        log_warn!("disarmed: {}", reason);
    }

    pub fn safety(&self) -> &SafetyMonitor {
        &self.safety
    }

    pub fn d1(&self) -> &DigitalFilter<3> {
        &self.d1
    }

    /// Final shutdown: outputs off, indicators dark.
    pub fn shutdown(&mut self) {
        self.motors.disable_all();
        self.led.set(LedColor::Red, false);
        self.led.set(LedColor::Green, false);
        log_info!("inner loop stopped");
    }
}

// ── Outer loop (D2) ──────────────────────────────────────────────────────────

pub struct OuterLoop {
    holding: bool,
}

impl OuterLoop {
    pub fn new() -> Self {
        Self { holding: false }
    }

    /// D2 as configured: first order, output limited to the lean budget.
    pub fn filter(config: &BalanceConfig) -> Result<DigitalFilter<2>, FilterError> {
        let mut d2 = DigitalFilter::new(config.outer_dt(), config.d2.num, config.d2.den)?
            .with_gain(config.d2.gain);
        d2.set_saturation(-config.theta_ref_max, config.theta_ref_max)?;
        Ok(d2)
    }

    /// Step D2 once and publish the new lean setpoint.
    pub fn tick(&mut self, shared: &SharedState) -> f32 {
        let first = !self.holding;
        self.holding = true;

        // phi is read under the lock so an arm reset can't land between
        // the read and the step
        let (u, phi) = shared.with_cascade(|cascade| {
            let phi = shared.phi();
            if first {
                // Hold wherever the robot is when the outer loop starts
                cascade.setpoint.phi = phi;
            }
            let u = cascade.d2.step(cascade.setpoint.phi - phi);
            cascade.setpoint.theta = u;
            shared.set_d2_u(u);
            (u, phi)
        });

        if first {
            log_info!("outer loop holding phi = {}", phi);
        }
        u
    }
}

impl Default for OuterLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{MockEncoders, MockLed, MockMotors};
    use crate::safety::ArmState;
    use crate::state::Setpoint;

    const G: f32 = 9.81;

    fn sample_at(theta: f32) -> ImuSample {
        ImuSample {
            accel: [0.0, G * theta.cos(), -G * theta.sin()],
            gyro: [0.0; 3],
        }
    }

    type TestLoop = InnerLoop<MockEncoders, MockMotors, MockLed>;

    fn setup() -> (TestLoop, SharedState) {
        let config = BalanceConfig::default();
        let inner = InnerLoop::new(
            &config,
            MockEncoders::default(),
            MockMotors::default(),
            MockLed::default(),
        )
        .unwrap();
        let shared = SharedState::new(OuterLoop::filter(&config).unwrap());
        shared.set_running();
        (inner, shared)
    }

    /// Let the estimator settle upright, then take the arming tick.
    fn settle_and_arm(inner: &mut TestLoop, shared: &SharedState) {
        for _ in 0..BalanceConfig::default().estimator_settle_ticks() {
            assert_eq!(inner.tick(&sample_at(0.0), shared), TickOutcome::Idle);
        }
        assert_eq!(inner.tick(&sample_at(0.0), shared), TickOutcome::Armed);
    }

    #[test]
    fn starts_disarmed_with_red_indicator() {
        let (inner, shared) = setup();
        assert_eq!(inner.safety().state(), ArmState::Disarmed);
        assert_eq!(shared.arm_state(), ArmState::Disarmed);
        assert!(inner.led.red);
        assert!(!inner.led.green);
    }

    #[test]
    fn disarmed_tilt_estimates_without_actuation() {
        let (mut inner, shared) = setup();
        inner.encoders.left = 500;

        for _ in 0..100 {
            assert_eq!(inner.tick(&sample_at(0.6), &shared), TickOutcome::Idle);
        }

        assert_eq!(inner.motors.writes, 0);
        assert!((shared.theta() - 0.6).abs() < 0.01);
        assert!(shared.phi() != 0.0);
    }

    #[test]
    fn arms_when_upright_then_drives_both_wheels_with_polarity() {
        let (mut inner, shared) = setup();
        inner.encoders.left = 120;
        inner.encoders.right = -80;
        shared.with_cascade(|c| c.setpoint.theta = 0.3);

        for _ in 0..50 {
            assert_eq!(inner.tick(&sample_at(0.05), &shared), TickOutcome::Idle);
        }
        assert_eq!(inner.tick(&sample_at(0.05), &shared), TickOutcome::Armed);
        assert_eq!(shared.arm_state(), ArmState::Armed);
        assert!(inner.motors.enabled);
        assert_eq!(inner.motors.writes, 0);
        assert_eq!((inner.encoders.left, inner.encoders.right), (0, 0));
        assert_eq!(shared.setpoint().theta, 0.0);
        assert!(inner.led.green && !inner.led.red);

        // First armed tick sits at the bottom of the soft-start ramp
        assert_eq!(
            inner.tick(&sample_at(0.05), &shared),
            TickOutcome::Actuated { duty: 0.0 }
        );

        let duty = match inner.tick(&sample_at(0.05), &shared) {
            TickOutcome::Actuated { duty } => duty,
            other => panic!("unexpected {:?}", other),
        };
        assert!(duty != 0.0);
        assert_eq!(inner.motors.left, duty);
        assert_eq!(inner.motors.right, -duty);
        assert_eq!(shared.d1_u(), duty);
    }

    #[test]
    fn arms_once_while_upright() {
        let (mut inner, shared) = setup();
        let arms = (0..200)
            .filter(|_| inner.tick(&sample_at(0.0), &shared) == TickOutcome::Armed)
            .count();
        assert_eq!(arms, 1);
        assert_eq!(inner.encoders.resets, 2);
    }

    #[test]
    fn tip_over_disarms_and_cuts_motors() {
        let (mut inner, shared) = setup();
        settle_and_arm(&mut inner, &shared);
        assert_eq!(shared.arm_state(), ArmState::Armed);

        let mut outcome = TickOutcome::Idle;
        for _ in 0..60 {
            outcome = inner.tick(&sample_at(1.2), &shared);
            if matches!(outcome, TickOutcome::Disarmed(_)) {
                break;
            }
        }

        assert_eq!(outcome, TickOutcome::Disarmed(DisarmReason::TipOver));
        assert!(!inner.motors.enabled);
        assert!(inner.led.red && !inner.led.green);
        assert_eq!(shared.arm_state(), ArmState::Disarmed);
    }

    #[test]
    fn sustained_saturation_trips_stall_protection() {
        let (mut inner, shared) = setup();
        settle_and_arm(&mut inner, &shared);

        // A held lean command the wheels cannot satisfy pins D1 at its rail
        shared.with_cascade(|c| c.setpoint.theta = 0.4);

        let mut ticks = 0;
        let outcome = loop {
            ticks += 1;
            let outcome = inner.tick(&sample_at(0.0), &shared);
            if !matches!(outcome, TickOutcome::Actuated { .. }) || ticks > 500 {
                break outcome;
            }
        };

        assert_eq!(outcome, TickOutcome::Disarmed(DisarmReason::Stall));
        assert!(!inner.motors.enabled);
        assert_eq!(inner.safety().saturation_count(), 0);
        // Ramp, then more than half a second pinned at the rail
        assert!(ticks > 50);
    }

    #[test]
    fn exiting_forces_motors_off_every_tick() {
        let (mut inner, shared) = setup();
        settle_and_arm(&mut inner, &shared);
        shared.request_exit();

        assert_eq!(inner.tick(&sample_at(0.0), &shared), TickOutcome::Exiting);
        assert_eq!(inner.tick(&sample_at(0.0), &shared), TickOutcome::Exiting);
        assert!(!inner.motors.enabled);
        assert_eq!(inner.motors.disable_calls, 2);

        inner.shutdown();
        assert!(!inner.led.red && !inner.led.green);
    }

    #[test]
    fn outer_loop_holds_start_position() {
        let (_, shared) = setup();
        shared.publish_estimate(1.0, 1.0, 0.0, 1.0);
        let mut outer = OuterLoop::new();

        let u = outer.tick(&shared);

        assert_eq!(u, 0.0);
        assert_eq!(shared.setpoint().phi, 1.0);
        assert_eq!(shared.setpoint().theta, 0.0);
    }

    #[test]
    fn setpoint_theta_tracks_latest_d2_output() {
        let (_, shared) = setup();
        let mut outer = OuterLoop::new();
        shared.publish_estimate(0.0, 0.0, 0.01, 0.01);
        outer.tick(&shared);

        for k in 1..40 {
            let phi = 0.01 + 0.2 * k as f32;
            shared.publish_estimate(phi, phi, 0.0, phi);
            let u = outer.tick(&shared);
            assert_eq!(shared.setpoint().theta, u);
            assert_eq!(shared.d2_u(), u);
            assert!(u.abs() <= 0.4);
        }
    }

    #[test]
    fn arming_resets_outer_loop_state() {
        let (mut inner, shared) = setup();
        let mut outer = OuterLoop::new();
        shared.publish_estimate(0.0, 0.0, 0.0, 0.5);
        outer.tick(&shared);
        shared.publish_estimate(0.0, 0.0, 0.0, 3.0);
        outer.tick(&shared);
        assert!(shared.setpoint().theta != 0.0);

        settle_and_arm(&mut inner, &shared);

        assert_eq!(shared.setpoint().theta, 0.0);
        assert_eq!(shared.setpoint().phi, 0.0);
        assert_eq!(shared.d2_u(), 0.0);
        shared.with_cascade(|c| assert_eq!(c.d2.steps(), 0));
    }

    #[test]
    fn outer_tick_right_after_arming_sees_zeroed_position() {
        let (mut inner, shared) = setup();
        let mut outer = OuterLoop::new();
        inner.encoders.left = 1000;
        inner.encoders.right = -1000;

        for k in 0..BalanceConfig::default().estimator_settle_ticks() {
            assert_eq!(inner.tick(&sample_at(0.0), &shared), TickOutcome::Idle);
            if k == 0 {
                outer.tick(&shared);
            }
        }
        assert!(shared.phi().abs() > 1.0);
        assert_eq!(inner.tick(&sample_at(0.0), &shared), TickOutcome::Armed);

        // Published position already reflects the zeroed encoders
        assert_eq!(shared.phi(), shared.theta());

        // Outer loop fires before the next inner tick
        let u = outer.tick(&shared);

        assert_eq!(u, 0.0);
        assert_eq!(shared.setpoint(), Setpoint::default());
        assert_eq!(shared.d2_u(), 0.0);
    }
}
