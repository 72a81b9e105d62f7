use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use mip_balance::state::{RunState, SharedState};

use crate::drivers::battery::BatteryMonitor;

const BATTERY_HZ: u64 = 2;
/// 2S pack, below this the motors lose authority
const LOW_BATTERY_V: f32 = 6.6;

/// Samples pack voltage into the shared state. Informational only.
#[task]
pub async fn battery_task(mut monitor: BatteryMonitor, shared: &'static SharedState) {
    let mut ticker = Ticker::every(Duration::from_hz(BATTERY_HZ));
    let mut warned = false;

    loop {
        ticker.next().await;
        if shared.run_state() == RunState::Exiting {
            break;
        }

        let volts = monitor.read_volts();
        shared.set_battery_volts(volts);

        if volts < LOW_BATTERY_V && !warned {
            defmt::warn!("battery low: {} V", volts);
            warned = true;
        }
    }
}
