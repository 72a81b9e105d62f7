//! Complementary body-angle estimator.
//!
//! Accelerometer tilt is drift-free but noisy, the integrated gyro is smooth
//! but drifts. Low-passing the first and high-passing the second with
//! matched time constants and summing gives theta.

#[allow(unused_imports)]
use micromath::F32Ext;

use crate::config::{HIGH_PASS_DEN, HIGH_PASS_NUM, LOW_PASS_DEN, LOW_PASS_NUM};
use crate::error::FilterError;
use crate::filter::DigitalFilter;
use crate::hal::ImuSample;

pub struct AngleEstimator {
    dt: f32,
    low_pass: DigitalFilter<2>,
    high_pass: DigitalFilter<2>,
    gyro_angle: f32,
    theta: f32,
}

impl AngleEstimator {
    pub fn new(dt: f32) -> Result<Self, FilterError> {
        Ok(Self {
            dt,
            low_pass: DigitalFilter::new(dt, LOW_PASS_NUM, LOW_PASS_DEN)?,
            high_pass: DigitalFilter::new(dt, HIGH_PASS_NUM, HIGH_PASS_DEN)?,
            gyro_angle: 0.0,
            theta: 0.0,
        })
    }

    /// Fold in one body-frame sample and return the new theta (rad).
    pub fn update(&mut self, sample: &ImuSample) -> f32 {
        let accel_angle = (-sample.accel[2]).atan2(sample.accel[1]);

        // Integrated for the life of the estimator; the high-pass removes drift
        self.gyro_angle += sample.gyro[0].to_radians() * self.dt;

        self.theta = self.low_pass.step(accel_angle) + self.high_pass.step(self.gyro_angle);
        self.theta
    }

    pub fn theta(&self) -> f32 {
        self.theta
    }

    pub fn gyro_angle(&self) -> f32 {
        self.gyro_angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.01;
    const G: f32 = 9.81;

    fn tilted(angle: f32, gyro_rad_s: f32) -> ImuSample {
        ImuSample {
            accel: [0.0, G * angle.cos(), -G * angle.sin()],
            gyro: [gyro_rad_s.to_degrees(), 0.0, 0.0],
        }
    }

    #[test]
    fn static_tilt_converges_to_accelerometer_angle() {
        let mut est = AngleEstimator::new(DT).unwrap();
        let sample = tilted(0.2, 0.0);

        for _ in 0..200 {
            est.update(&sample);
        }
        assert!((est.theta() - 0.2).abs() < 1e-3, "theta = {}", est.theta());
        assert_eq!(est.gyro_angle(), 0.0);
    }

    #[test]
    fn tracks_rotation_when_sensors_agree() {
        let mut est = AngleEstimator::new(DT).unwrap();
        let rate = 0.1; // rad/s

        let mut angle = 0.0;
        for _ in 0..300 {
            angle += rate * DT;
            est.update(&tilted(angle, rate));
        }
        assert!((est.theta() - angle).abs() < 5e-3, "{} vs {}", est.theta(), angle);
    }

    #[test]
    fn state_carries_across_ticks() {
        let mut running = AngleEstimator::new(DT).unwrap();
        running.update(&tilted(0.3, 0.5));
        let second = running.update(&tilted(0.3, 0.5));

        let mut fresh = AngleEstimator::new(DT).unwrap();
        let first_only = fresh.update(&tilted(0.3, 0.5));

        assert!(second != first_only);
        assert!((running.gyro_angle() - 2.0 * 0.5 * DT).abs() < 1e-6);
    }
}
