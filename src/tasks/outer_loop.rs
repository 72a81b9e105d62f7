use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use mip_balance::controller::OuterLoop;
use mip_balance::state::{RunState, SharedState};

/// Outer loop (D2) at a fixed rate in thread mode.
///
/// Only spawned once the inner loop has produced a wheel position, so the
/// first tick always holds a real phi.
#[task]
pub async fn outer_loop_task(shared: &'static SharedState, rate_hz: u32) {
    let mut outer = OuterLoop::new();
    let mut ticker = Ticker::every(Duration::from_hz(rate_hz as u64));

    loop {
        ticker.next().await;

        if shared.run_state() == RunState::Exiting {
            break;
        }
        outer.tick(shared);
    }

    defmt::info!("outer loop stopped");
}
