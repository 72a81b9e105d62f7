#![no_std]
#![no_main]

mod board;
mod drivers;
mod tasks;
mod usb;

use embassy_executor::{InterruptExecutor, SpawnError, Spawner};
use embassy_futures::select::{select, Either};
use embassy_stm32::adc::Adc;
use embassy_stm32::dma::NoDma;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pin, Pull, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::peripherals::PB2;
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::timer::qei::{Qei, QeiPin};
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::CountingMode;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Delay, Duration, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use mip_balance::config::BalanceConfig;
use mip_balance::controller::{InnerLoop, OuterLoop};
use mip_balance::error::InitError;
use mip_balance::state::{Readiness, RunState, SharedState};
use mip_balance::telemetry::DiagSample;

use crate::drivers::battery::BatteryMonitor;
use crate::drivers::encoder::WheelEncoders;
use crate::drivers::icm42688::Icm42688;
use crate::drivers::led::StatusLeds;
use crate::drivers::motor::HBridgeMotors;
use crate::tasks::battery_task::battery_task;
use crate::tasks::inner_loop::inner_loop_task;
use crate::tasks::outer_loop::outer_loop_task;
use crate::tasks::telemetry_task::telemetry_task;

/// Inner loop must produce a wheel position within this long of IMU start.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);
/// How often the supervisor polls the run state
const SUPERVISOR_POLL: Duration = Duration::from_millis(10);
/// Enough inner ticks for the loop to see EXITING and release its hardware
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

// ── Shared state ──────────────────────────────────────────────────────────────
static SHARED: StaticCell<SharedState> = StaticCell::new();

// ── Inter-task channels ───────────────────────────────────────────────────────
//  Cap=1: the console only wants the latest tick; it drops what it can't keep up with.
static DIAG_CHAN: Channel<CriticalSectionRawMutex, DiagSample, 1> = Channel::new();

// ── Inner-loop executor ───────────────────────────────────────────────────────
//  Runs from the UART5 vector (unused on this board) so the balance loop
//  preempts the USB console and the outer loop.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART5() {
    EXECUTOR_HIGH.on_interrupt()
}

fn fatal(err: InitError) -> ! {
    defmt::panic!("startup failed: {}", err)
}

fn spawned(result: Result<(), SpawnError>) {
    if result.is_err() {
        fatal(InitError::Spawn);
    }
}

// ── Stop button ───────────────────────────────────────────────────────────────
#[embassy_executor::task]
async fn stop_button_task(mut button: ExtiInput<'static, PB2>, shared: &'static SharedState) {
    loop {
        button.wait_for_falling_edge().await;
        // Debounce
        Timer::after(Duration::from_millis(20)).await;
        if button.is_low() {
            break;
        }
    }
    defmt::info!("stop button pressed");
    shared.request_exit();
}

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let config = BalanceConfig::default();

    // 1. Board init (168 MHz PLL)
    let p = board::init();

    // 2. USB (CDC-ACM console)
    let (usb_dev, usb_serial) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
    spawned(spawner.spawn(usb::usb_task(usb_dev)));

    // 3. Status LEDs, red = disarmed
    let leds = StatusLeds::new(
        Output::new(p.PC13.degrade(), Level::High, Speed::Low),
        Output::new(p.PC14.degrade(), Level::Low, Speed::Low),
    );

    // 4. SPI1 @ 10 MHz: ICM-42688 IMU, data-ready on PC4
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = TimeHertz(board::IMU_SPI_HZ);
    let spi = Spi::new(p.SPI1, p.PA5, p.PA7, p.PA6, NoDma, NoDma, spi_config);
    let cs_imu = Output::new(p.PB12.degrade(), Level::High, Speed::VeryHigh);
    let mut imu = Icm42688::new(spi, cs_imu, config.orientation);
    let data_ready = ExtiInput::new(Input::new(p.PC4, Pull::Down), p.EXTI4);

    // 5. Motors: TIM3 CH3/CH4 PWM, DIR on PC8/PC9, bridge standby on PB5
    let pwm = SimplePwm::new(
        p.TIM3,
        None,
        None,
        Some(PwmPin::new_ch3(p.PB0, OutputType::PushPull)),
        Some(PwmPin::new_ch4(p.PB1, OutputType::PushPull)),
        TimeHertz(board::MOTOR_PWM_HZ),
        CountingMode::EdgeAlignedUp,
    );
    let motors = HBridgeMotors::new(
        pwm,
        Output::new(p.PC8.degrade(), Level::Low, Speed::Low),
        Output::new(p.PC9.degrade(), Level::Low, Speed::Low),
        Output::new(p.PB5.degrade(), Level::Low, Speed::Low),
    );

    // 6. Wheel encoders: TIM4 (left), TIM8 (right)
    let encoders = WheelEncoders::new(
        Qei::new(p.TIM4, QeiPin::new_ch1(p.PB6), QeiPin::new_ch2(p.PB7)),
        Qei::new(p.TIM8, QeiPin::new_ch1(p.PC6), QeiPin::new_ch2(p.PC7)),
    );

    // 7. Battery sense on PC2
    let battery = BatteryMonitor::new(Adc::new(p.ADC1, &mut Delay), p.PC2);

    // 8. Controllers and shared state
    let d2 = OuterLoop::filter(&config).unwrap_or_else(|err| fatal(err.into()));
    let shared: &'static SharedState = SHARED.init(SharedState::new(d2));
    let controller =
        InnerLoop::new(&config, encoders, motors, leds).unwrap_or_else(|err| fatal(err.into()));

    // 9. IMU hardware init (ODR = inner loop rate, data-ready on INT1)
    Timer::after(Duration::from_millis(100)).await;
    if let Err(err) = imu.configure(config.sample_rate_hz).await {
        defmt::error!("IMU configuration failed: {}", err);
        fatal(InitError::Imu);
    }

    // 10. Console and stop button
    spawned(spawner.spawn(telemetry_task(usb_serial, DIAG_CHAN.receiver())));
    let stop_button = ExtiInput::new(Input::new(p.PB2, Pull::Up), p.EXTI2);
    spawned(spawner.spawn(stop_button_task(stop_button, shared)));

    // 11. Inner loop on the interrupt executor
    interrupt::UART5.set_priority(Priority::P6);
    let high_spawner = EXECUTOR_HIGH.start(interrupt::UART5);
    spawned(high_spawner.spawn(inner_loop_task(
        imu,
        data_ready,
        controller,
        shared,
        DIAG_CHAN.sender(),
    )));

    // 12. Outer loop only once the inner loop has a wheel position
    match select(shared.wait_for_phi(), Timer::after(STARTUP_TIMEOUT)).await {
        Either::First(Readiness::PhiValid) => {
            spawned(spawner.spawn(outer_loop_task(shared, config.outer_rate_hz)));
            spawned(spawner.spawn(battery_task(battery, shared)));
            shared.set_running();
            defmt::info!("balance controller running");
        }
        Either::First(Readiness::Exiting) => {
            defmt::warn!("exit requested during startup");
        }
        Either::Second(()) => {
            defmt::error!("no IMU data within {} ms", STARTUP_TIMEOUT.as_millis());
            fatal(InitError::Imu);
        }
    }

    // 13. Supervise until stop is requested
    while shared.run_state() != RunState::Exiting {
        Timer::after(SUPERVISOR_POLL).await;
    }

    // 14. Inner loop disables the motors and powers down the IMU on its next tick
    Timer::after(SHUTDOWN_GRACE).await;
    let snap = shared.snapshot();
    defmt::info!(
        "stopped: theta={} phi={} battery={} V",
        snap.theta,
        snap.phi,
        snap.battery_volts
    );

    core::future::pending::<()>().await;
}
