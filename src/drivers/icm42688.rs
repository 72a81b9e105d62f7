use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Error, Instance, Spi};
use embassy_time::{Duration, Timer};

use mip_balance::hal::{ImuSample, Orientation};

// ── Register map (bank 0) ─────────────────────────────────────────────────────

const DEVICE_CONFIG: u8 = 0x11;
const INT_CONFIG: u8 = 0x14;
const ACCEL_DATA_X1: u8 = 0x1F;
const INT_STATUS: u8 = 0x2D;
const PWR_MGMT0: u8 = 0x4E;
const GYRO_CONFIG0: u8 = 0x4F;
const ACCEL_CONFIG0: u8 = 0x50;
const INT_CONFIG1: u8 = 0x64;
const INT_SOURCE0: u8 = 0x65;
const WHO_AM_I: u8 = 0x75;

const DEVICE_ID: u8 = 0x47;

/// ±2000 dps full scale
const GYRO_LSB_PER_DPS: f32 = 16.4;
/// ±16 g full scale
const ACCEL_LSB_PER_G: f32 = 2048.0;
const STANDARD_GRAVITY: f32 = 9.80665;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ImuError {
    Spi,
    /// WHO_AM_I returned something other than an ICM-42688
    WrongDevice(u8),
    /// No ODR code for the requested rate
    UnsupportedRate(u32),
}

impl From<Error> for ImuError {
    fn from(_: Error) -> Self {
        Self::Spi
    }
}

/// ODR field shared by GYRO_CONFIG0 and ACCEL_CONFIG0.
fn odr_code(rate_hz: u32) -> Result<u8, ImuError> {
    match rate_hz {
        1000 => Ok(0x06),
        200 => Ok(0x07),
        100 => Ok(0x08),
        50 => Ok(0x09),
        25 => Ok(0x0A),
        other => Err(ImuError::UnsupportedRate(other)),
    }
}

pub struct Icm42688<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
    orientation: Orientation,
}

impl<'d, T: Instance> Icm42688<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>, orientation: Orientation) -> Self {
        Self { spi, cs, orientation }
    }

    async fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        let buf = [reg & 0x7F, value];
        self.cs.set_low();
        let res = self.spi.blocking_write(&buf);
        self.cs.set_high();
        res
    }

    async fn read_reg(&mut self, reg: u8) -> Result<u8, Error> {
        let tx = [reg | 0x80, 0x00];
        let mut rx = [0u8; 2];

        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &tx);
        self.cs.set_high();

        res?;
        Ok(rx[1])
    }

    /// Reset the part, then start both sensors at `rate_hz` with a
    /// data-ready pulse on INT1 for every new sample.
    pub async fn configure(&mut self, rate_hz: u32) -> Result<(), ImuError> {
        let odr = odr_code(rate_hz)?;

        self.write_reg(DEVICE_CONFIG, 0x01).await?;
        Timer::after(Duration::from_millis(10)).await;

        let id = self.read_reg(WHO_AM_I).await?;
        if id != DEVICE_ID {
            return Err(ImuError::WrongDevice(id));
        }

        // FS_SEL 0 in the upper bits: ±2000 dps / ±16 g
        self.write_reg(GYRO_CONFIG0, odr).await?;
        self.write_reg(ACCEL_CONFIG0, odr).await?;

        // INT1: pulsed, push-pull, active high
        self.write_reg(INT_CONFIG, 0x03).await?;
        // INT_ASYNC_RESET must be cleared for INT1 to behave
        self.write_reg(INT_CONFIG1, 0x00).await?;
        // UI_DRDY_INT1_EN
        self.write_reg(INT_SOURCE0, 0x08).await?;

        // Gyro and accel in low-noise mode
        self.write_reg(PWR_MGMT0, 0x0F).await?;
        Timer::after(Duration::from_millis(50)).await;

        // Drop whatever flagged during startup
        self.read_reg(INT_STATUS).await?;

        defmt::info!("ICM-42688 ready, ODR {} Hz", rate_hz);
        Ok(())
    }

    pub async fn read_raw(&mut self) -> Result<([i16; 3], [i16; 3]), Error> {
        let mut tx = [0u8; 13];
        tx[0] = ACCEL_DATA_X1 | 0x80;
        let mut rx = [0u8; 13];

        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &tx);
        self.cs.set_high();
        res?;

        let word = |i: usize| i16::from_be_bytes([rx[i], rx[i + 1]]);
        Ok(([word(1), word(3), word(5)], [word(7), word(9), word(11)]))
    }

    /// Latest sample in SI-ish units (m/s², deg/s), rotated into the body frame.
    pub async fn read_sample(&mut self) -> Result<ImuSample, ImuError> {
        let (accel, gyro) = self.read_raw().await?;

        let sample = ImuSample {
            accel: accel.map(|a| a as f32 / ACCEL_LSB_PER_G * STANDARD_GRAVITY),
            gyro: gyro.map(|g| g as f32 / GYRO_LSB_PER_DPS),
        };
        Ok(self.orientation.remap_sample(sample))
    }

    /// Sensors off, interrupt source cleared.
    pub async fn shutdown(&mut self) -> Result<(), ImuError> {
        self.write_reg(INT_SOURCE0, 0x00).await?;
        self.write_reg(PWR_MGMT0, 0x00).await?;
        Ok(())
    }
}
