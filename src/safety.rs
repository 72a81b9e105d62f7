//! Arm/disarm gating for the balance controller.
//!
//! Decisions only; the inner loop carries out the side effects (motor
//! enable, encoder zeroing, indicator colors) of each transition.

#[allow(unused_imports)]
use micromath::F32Ext;

use core::fmt;

use crate::config::BalanceConfig;
use crate::state::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmState {
    Armed,
    Disarmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisarmReason {
    /// Lean exceeded the recoverable range.
    TipOver,
    /// D1 stayed pinned at its duty limit.
    Stall,
}

impl fmt::Display for DisarmReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TipOver => write!(f, "tip-over"),
            Self::Stall => write!(f, "stall"),
        }
    }
}

/// What the inner loop should do with the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SafetyDecision {
    /// Shutdown in progress: force motors off.
    Exit,
    /// Disarmed and not upright enough to arm.
    Hold,
    /// Transition to armed; actuation resumes next tick.
    Arm,
    /// Transition to disarmed.
    Disarm(DisarmReason),
    /// Armed and within range: run D1.
    Run,
}

pub struct SafetyMonitor {
    state: ArmState,
    tip_angle: f32,
    arm_angle: f32,
    stall_limit: u32,
    saturated_ticks: u32,
}

impl SafetyMonitor {
    pub fn new(config: &BalanceConfig) -> Self {
        Self {
            state: ArmState::Disarmed,
            tip_angle: config.tip_angle_rad,
            arm_angle: config.arm_angle_rad,
            stall_limit: config.stall_limit_ticks(),
            saturated_ticks: 0,
        }
    }

    pub fn state(&self) -> ArmState {
        self.state
    }

    pub fn saturation_count(&self) -> u32 {
        self.saturated_ticks
    }

    /// Pre-actuation guard evaluation for one tick.
    pub fn evaluate(&self, theta: f32, run_state: RunState) -> SafetyDecision {
        if run_state == RunState::Exiting {
            return SafetyDecision::Exit;
        }
        match self.state {
            ArmState::Disarmed if theta.abs() < self.arm_angle => SafetyDecision::Arm,
            ArmState::Disarmed => SafetyDecision::Hold,
            ArmState::Armed if theta.abs() > self.tip_angle => {
                SafetyDecision::Disarm(DisarmReason::TipOver)
            }
            ArmState::Armed => SafetyDecision::Run,
        }
    }

    /// Feed D1's saturation flag after a control step.
    ///
    /// Returns `Some(Stall)` once the run of saturated ticks exceeds the
    /// limit; the counter restarts from zero.
    pub fn record_saturation(&mut self, saturated: bool) -> Option<DisarmReason> {
        if saturated {
            self.saturated_ticks += 1;
        } else {
            self.saturated_ticks = 0;
        }

        if self.saturated_ticks > self.stall_limit {
            self.saturated_ticks = 0;
            Some(DisarmReason::Stall)
        } else {
            None
        }
    }

    pub fn arm(&mut self) {
        self.state = ArmState::Armed;
        self.saturated_ticks = 0;
    }

    pub fn disarm(&mut self) {
        self.state = ArmState::Disarmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> SafetyMonitor {
        SafetyMonitor::new(&BalanceConfig::default())
    }

    /// Apply decisions the way the inner loop does and count arm transitions.
    fn drive(monitor: &mut SafetyMonitor, thetas: &[f32]) -> usize {
        let mut arms = 0;
        for &theta in thetas {
            match monitor.evaluate(theta, RunState::Running) {
                SafetyDecision::Arm => {
                    monitor.arm();
                    arms += 1;
                }
                SafetyDecision::Disarm(_) => monitor.disarm(),
                _ => {}
            }
        }
        arms
    }

    #[test]
    fn starts_disarmed_and_arms_exactly_once() {
        let mut m = monitor();
        assert_eq!(m.state(), ArmState::Disarmed);

        let arms = drive(&mut m, &[1.2, 0.9, 0.5, 0.29, 0.1, 0.0, -0.1, 0.2]);
        assert_eq!(arms, 1);
        assert_eq!(m.state(), ArmState::Armed);
    }

    #[test]
    fn holds_between_arm_and_tip_thresholds() {
        let m = monitor();
        assert_eq!(m.evaluate(0.5, RunState::Running), SafetyDecision::Hold);
        assert_eq!(m.evaluate(-0.3, RunState::Running), SafetyDecision::Hold);
    }

    #[test]
    fn single_tip_tick_disarms() {
        let mut m = monitor();
        m.arm();
        assert_eq!(m.evaluate(0.79, RunState::Running), SafetyDecision::Run);
        assert_eq!(
            m.evaluate(-0.81, RunState::Running),
            SafetyDecision::Disarm(DisarmReason::TipOver)
        );
        m.disarm();
        // Fallen robot stays disarmed without re-firing the tip guard
        assert_eq!(m.evaluate(1.5, RunState::Running), SafetyDecision::Hold);
    }

    #[test]
    fn stall_trips_after_limit_and_clears_counter() {
        let mut m = monitor();
        m.arm();
        for _ in 0..50 {
            assert_eq!(m.record_saturation(true), None);
        }
        assert_eq!(m.saturation_count(), 50);
        assert_eq!(m.record_saturation(true), Some(DisarmReason::Stall));
        assert_eq!(m.saturation_count(), 0);
    }

    #[test]
    fn unsaturated_tick_resets_stall_counter() {
        let mut m = monitor();
        m.arm();
        for _ in 0..45 {
            m.record_saturation(true);
        }
        assert_eq!(m.record_saturation(false), None);
        assert_eq!(m.saturation_count(), 0);
        for _ in 0..50 {
            assert_eq!(m.record_saturation(true), None);
        }
    }

    #[test]
    fn exiting_overrides_arm_state() {
        let mut m = monitor();
        assert_eq!(m.evaluate(0.0, RunState::Exiting), SafetyDecision::Exit);
        m.arm();
        assert_eq!(m.evaluate(0.0, RunState::Exiting), SafetyDecision::Exit);
    }
}
