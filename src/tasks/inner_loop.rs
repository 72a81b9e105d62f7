use embassy_executor::task;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::peripherals::{PC4, SPI1};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;

use mip_balance::controller::{InnerLoop, TickOutcome};
use mip_balance::safety::ArmState;
use mip_balance::state::SharedState;
use mip_balance::telemetry::DiagSample;

use crate::drivers::encoder::WheelEncoders;
use crate::drivers::icm42688::Icm42688;
use crate::drivers::led::StatusLeds;
use crate::drivers::motor::HBridgeMotors;

pub type BalanceLoop = InnerLoop<WheelEncoders, HBridgeMotors, StatusLeds>;

/// Consecutive failed IMU reads tolerated before the motors are cut.
const MAX_READ_FAILURES: u32 = 10;

/// Inner loop: one tick per IMU data-ready edge.
///
/// Spawned on the interrupt executor so it preempts everything running in
/// thread mode.
#[task]
pub async fn inner_loop_task(
    mut imu: Icm42688<'static, SPI1>,
    mut data_ready: ExtiInput<'static, PC4>,
    mut controller: BalanceLoop,
    shared: &'static SharedState,
    diag_tx: Sender<'static, CriticalSectionRawMutex, DiagSample, 1>,
) {
    let mut read_failures: u32 = 0;

    loop {
        data_ready.wait_for_rising_edge().await;

        // ── A. Read IMU ──────────────────────────────────────────────────────
        let sample = match imu.read_sample().await {
            Ok(sample) => {
                read_failures = 0;
                sample
            }
            Err(err) => {
                read_failures += 1;
                if read_failures == MAX_READ_FAILURES {
                    defmt::error!("IMU read failing ({}), requesting shutdown", err);
                    shared.request_exit();
                    break;
                }
                continue;
            }
        };

        // ── B. Control tick ──────────────────────────────────────────────────
        let outcome = controller.tick(&sample, shared);

        // ── C. Diagnostics (drop if the console is behind) ───────────────────
        let _ = diag_tx.try_send(DiagSample {
            theta: shared.theta(),
            phi: shared.phi(),
            armed: shared.arm_state() == ArmState::Armed,
        });

        if outcome == TickOutcome::Exiting {
            break;
        }
    }

    // ── D. Release hardware ──────────────────────────────────────────────────
    controller.shutdown();
    if imu.shutdown().await.is_err() {
        defmt::warn!("IMU did not acknowledge shutdown");
    }
}
