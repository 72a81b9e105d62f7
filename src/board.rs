//! Clock tree and pin map for the STM32F405 controller board.
//!
//! | Function | Pins | Peripheral |
//! | -------- | ---- | ---------- |
//! | IMU SPI (SCK/MOSI/MISO/CS) | PA5 / PA7 / PA6 / PB12 | SPI1 |
//! | IMU data-ready | PC4 | EXTI4 |
//! | Motor PWM left / right | PB0 / PB1 | TIM3 CH3 / CH4 |
//! | Motor DIR left / right, standby | PC8 / PC9, PB5 | GPIO |
//! | Encoder left | PB6 / PB7 | TIM4 QEI |
//! | Encoder right | PC6 / PC7 | TIM8 QEI |
//! | LED red / green | PC13 / PC14 | GPIO |
//! | Stop button (active low) | PB2 | EXTI2 |
//! | Battery sense | PC2 | ADC1 IN12 |
//! | USB console | PA12 / PA11 | OTG_FS |

use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::{Config, Peripherals};

/// Motor PWM carrier, above hearing
pub const MOTOR_PWM_HZ: u32 = 20_000;
/// IMU SPI clock
pub const IMU_SPI_HZ: u32 = 10_000_000;

/// 8 MHz HSE → 168 MHz SYSCLK, 48 MHz for USB.
fn clock_config() -> Config {
    let mut config = Config::default();
    config.rcc.hse = Some(Hse {
        freq: TimeHertz(8_000_000),
        mode: HseMode::Oscillator,
    });
    config.rcc.pll_src = PllSource::HSE;
    config.rcc.pll = Some(Pll {
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL168,
        divp: Some(PllPDiv::DIV2),
        divq: Some(PllQDiv::DIV7),
        divr: None,
    });
    config.rcc.sys = Sysclk::PLL1_P;
    config.rcc.ahb_pre = AHBPrescaler::DIV1;
    config.rcc.apb1_pre = APBPrescaler::DIV4;
    config.rcc.apb2_pre = APBPrescaler::DIV2;
    config
}

pub fn init() -> Peripherals {
    embassy_stm32::init(clock_config())
}
