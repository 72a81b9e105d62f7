//! Shared state between the inner (data-ready) and outer (20 Hz) loops.
//!
//! Every scalar has exactly one writer context and is stored in an atomic,
//! so readers see a whole value that is at most one tick stale. D2 and the
//! setpoint it produces sit together behind a critical-section mutex: the
//! outer loop steps D2 and publishes `setpoint.theta` in one locked section,
//! and the arm transition resets both in another, so `setpoint.theta` always
//! equals D2's latest output.
use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::filter::DigitalFilter;
use crate::safety::ArmState;

// ── Atomic f32 ────────────────────────────────────────────────────────────────

/// `f32` stored as its bit pattern in an `AtomicU32`.
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub const fn zero() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

// ── Data types ────────────────────────────────────────────────────────────────

/// Process-wide lifecycle, written only by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunState {
    Uninitialized,
    Running,
    Exiting,
}

impl RunState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Running => 1,
            Self::Exiting => 2,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Exiting,
            _ => Self::Uninitialized,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Setpoint {
    /// Target lean for D1 (rad)
    pub theta: f32,
    /// Target average wheel position for D2 (rad)
    pub phi: f32,
}

/// D2 plus the setpoint it drives; only touched under the cascade lock.
pub struct Cascade {
    pub d2: DigitalFilter<2>,
    pub setpoint: Setpoint,
}

/// Outcome of waiting for the inner loop to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Readiness {
    PhiValid,
    Exiting,
}

/// Copy of every published value, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StateSnapshot {
    pub wheel_angle_left: f32,
    pub wheel_angle_right: f32,
    pub theta: f32,
    pub phi: f32,
    pub d1_u: f32,
    pub d2_u: f32,
    pub battery_volts: f32,
    pub setpoint: Setpoint,
    pub armed: bool,
}

// ── Shared state ──────────────────────────────────────────────────────────────

pub struct SharedState {
    // inner loop
    wheel_angle_left: AtomicF32,
    wheel_angle_right: AtomicF32,
    theta: AtomicF32,
    phi: AtomicF32,
    d1_u: AtomicF32,
    arm_state: AtomicU8,
    // outer loop
    d2_u: AtomicF32,
    // battery task
    battery_volts: AtomicF32,
    // supervisor
    run_state: AtomicU8,

    cascade: Mutex<CriticalSectionRawMutex, RefCell<Cascade>>,
    ready: Signal<CriticalSectionRawMutex, Readiness>,
}

impl SharedState {
    pub fn new(d2: DigitalFilter<2>) -> Self {
        Self {
            wheel_angle_left: AtomicF32::zero(),
            wheel_angle_right: AtomicF32::zero(),
            theta: AtomicF32::zero(),
            phi: AtomicF32::zero(),
            d1_u: AtomicF32::zero(),
            arm_state: AtomicU8::new(0),
            d2_u: AtomicF32::zero(),
            battery_volts: AtomicF32::zero(),
            run_state: AtomicU8::new(RunState::Uninitialized.to_u8()),
            cascade: Mutex::new(RefCell::new(Cascade {
                d2,
                setpoint: Setpoint::default(),
            })),
            ready: Signal::new(),
        }
    }

    // ── Inner loop writes ─────────────────────────────────────────────────────

    pub fn publish_estimate(&self, wheel_left: f32, wheel_right: f32, theta: f32, phi: f32) {
        self.wheel_angle_left.store(wheel_left);
        self.wheel_angle_right.store(wheel_right);
        self.theta.store(theta);
        self.phi.store(phi);
    }

    pub fn set_d1_u(&self, u: f32) {
        self.d1_u.store(u);
    }

    pub fn set_arm_state(&self, state: ArmState) {
        let raw = match state {
            ArmState::Disarmed => 0,
            ArmState::Armed => 1,
        };
        self.arm_state.store(raw, Ordering::Release);
    }

    /// Wake whoever is blocked in [`wait_for_phi`](Self::wait_for_phi).
    pub fn announce_phi(&self) {
        self.ready.signal(Readiness::PhiValid);
    }

    /// Arm transition, called right after the encoders were zeroed.
    ///
    /// Wheel angles restart at zero so phi collapses to `theta`; setpoint,
    /// D2 history and `d2_u` are cleared under the same lock the outer loop
    /// steps in, so it never sees the pre-arm position against the new
    /// reference.
    pub fn reset_cascade(&self, theta: f32) {
        self.with_cascade(|cascade| {
            self.publish_estimate(0.0, 0.0, theta, theta);
            cascade.d2.reset();
            cascade.setpoint = Setpoint::default();
            self.d2_u.store(0.0);
        });
    }

    // ── Outer loop / battery writes ───────────────────────────────────────────

    pub fn set_d2_u(&self, u: f32) {
        self.d2_u.store(u);
    }

    pub fn set_battery_volts(&self, volts: f32) {
        self.battery_volts.store(volts);
    }

    /// Run `f` with exclusive access to D2 and the setpoint.
    ///
    /// Keep `f` short: it runs inside a critical section that also holds off
    /// the data-ready interrupt.
    pub fn with_cascade<R>(&self, f: impl FnOnce(&mut Cascade) -> R) -> R {
        self.cascade.lock(|cell| f(&mut *cell.borrow_mut()))
    }

    // ── Supervisor writes ─────────────────────────────────────────────────────

    /// Startup finished. Does nothing once shutdown has been requested.
    pub fn set_running(&self) {
        let _ = self.run_state.compare_exchange(
            RunState::Uninitialized.to_u8(),
            RunState::Running.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Begin shutdown and release anyone waiting on startup.
    pub fn request_exit(&self) {
        self.run_state
            .store(RunState::Exiting.to_u8(), Ordering::Release);
        self.ready.signal(Readiness::Exiting);
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn run_state(&self) -> RunState {
        RunState::from_u8(self.run_state.load(Ordering::Acquire))
    }

    pub fn arm_state(&self) -> ArmState {
        match self.arm_state.load(Ordering::Acquire) {
            1 => ArmState::Armed,
            _ => ArmState::Disarmed,
        }
    }

    pub fn theta(&self) -> f32 {
        self.theta.load()
    }

    pub fn phi(&self) -> f32 {
        self.phi.load()
    }

    pub fn d1_u(&self) -> f32 {
        self.d1_u.load()
    }

    pub fn d2_u(&self) -> f32 {
        self.d2_u.load()
    }

    pub fn battery_volts(&self) -> f32 {
        self.battery_volts.load()
    }

    pub fn setpoint(&self) -> Setpoint {
        self.with_cascade(|cascade| cascade.setpoint)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            wheel_angle_left: self.wheel_angle_left.load(),
            wheel_angle_right: self.wheel_angle_right.load(),
            theta: self.theta(),
            phi: self.phi(),
            d1_u: self.d1_u(),
            d2_u: self.d2_u(),
            battery_volts: self.battery_volts(),
            setpoint: self.setpoint(),
            armed: self.arm_state() == ArmState::Armed,
        }
    }

    /// Block until the inner loop has produced a non-zero phi, or until
    /// shutdown is requested, whichever comes first.
    pub async fn wait_for_phi(&self) -> Readiness {
        loop {
            if self.run_state() == RunState::Exiting {
                return Readiness::Exiting;
            }
            if self.phi() != 0.0 {
                return Readiness::PhiValid;
            }
            self.ready.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{D2_DEN, D2_NUM};
    use embassy_futures::block_on;

    fn shared() -> SharedState {
        SharedState::new(DigitalFilter::new(0.05, D2_NUM, D2_DEN).unwrap())
    }

    #[test]
    fn atomic_f32_keeps_sign_and_bits() {
        let cell = AtomicF32::zero();
        assert_eq!(cell.load(), 0.0);
        cell.store(-0.123);
        assert_eq!(cell.load(), -0.123);
    }

    #[test]
    fn run_state_lifecycle() {
        let state = shared();
        assert_eq!(state.run_state(), RunState::Uninitialized);
        state.set_running();
        assert_eq!(state.run_state(), RunState::Running);
        state.request_exit();
        assert_eq!(state.run_state(), RunState::Exiting);
    }

    #[test]
    fn exit_requested_during_startup_sticks() {
        let state = shared();
        state.request_exit();
        state.set_running();
        assert_eq!(state.run_state(), RunState::Exiting);
    }

    #[test]
    fn wait_for_phi_resolves_once_phi_is_published() {
        let state = shared();
        state.publish_estimate(0.1, 0.1, 0.02, 0.12);
        state.announce_phi();
        assert_eq!(block_on(state.wait_for_phi()), Readiness::PhiValid);
    }

    #[test]
    fn wait_for_phi_gives_up_on_exit() {
        let state = shared();
        state.request_exit();
        assert_eq!(block_on(state.wait_for_phi()), Readiness::Exiting);
    }

    #[test]
    fn reset_cascade_clears_setpoint_and_d2() {
        let state = shared();
        state.with_cascade(|c| {
            c.setpoint.phi = 1.0;
            c.setpoint.theta = c.d2.step(0.5);
        });
        state.publish_estimate(1.5, 1.7, 0.02, 1.62);
        state.set_d2_u(state.setpoint().theta);
        assert!(state.setpoint().theta != 0.0);

        state.reset_cascade(0.02);

        assert_eq!(state.setpoint(), Setpoint::default());
        assert_eq!(state.d2_u(), 0.0);
        assert_eq!(state.phi(), 0.02);
        assert_eq!(state.theta(), 0.02);
        let snap = state.snapshot();
        assert_eq!((snap.wheel_angle_left, snap.wheel_angle_right), (0.0, 0.0));
        assert_eq!(snap.d2_u, snap.setpoint.theta);
        state.with_cascade(|c| {
            assert_eq!(c.d2.steps(), 0);
            assert_eq!(c.d2.last_output(), c.setpoint.theta);
        });
    }

    #[test]
    fn snapshot_reflects_writers() {
        let state = shared();
        state.publish_estimate(0.5, 0.7, 0.1, 0.7);
        state.set_d1_u(0.25);
        state.set_d2_u(-0.05);
        state.set_battery_volts(7.4);
        state.set_arm_state(ArmState::Armed);

        let snap = state.snapshot();
        assert_eq!(snap.wheel_angle_left, 0.5);
        assert_eq!(snap.wheel_angle_right, 0.7);
        assert_eq!(snap.theta, 0.1);
        assert_eq!(snap.phi, 0.7);
        assert_eq!(snap.d1_u, 0.25);
        assert_eq!(snap.d2_u, -0.05);
        assert_eq!(snap.battery_volts, 7.4);
        assert!(snap.armed);
    }
}
