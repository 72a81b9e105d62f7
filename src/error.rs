//! Error types for filter configuration and firmware bring-up.

use core::fmt;

/// Rejected filter construction or configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterError {
    /// Coefficient arrays must hold at least one element.
    EmptyCoefficients,
    /// Sample interval must be finite and strictly positive.
    InvalidSampleTime,
    /// `den[0]` normalizes every output and cannot be zero.
    ZeroLeadingDenominator,
    /// Saturation bounds must be finite with `min <= max`.
    InvalidSaturationBounds,
    /// Soft-start duration must be finite and non-negative.
    InvalidSoftStart,
    /// The soft-start ramp scales the saturation bounds, which are not set yet.
    SoftStartWithoutSaturation,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCoefficients => write!(f, "filter needs at least one coefficient"),
            Self::InvalidSampleTime => write!(f, "sample interval must be positive"),
            Self::ZeroLeadingDenominator => write!(f, "leading denominator coefficient is zero"),
            Self::InvalidSaturationBounds => write!(f, "saturation bounds require min <= max"),
            Self::InvalidSoftStart => write!(f, "soft-start duration must be non-negative"),
            Self::SoftStartWithoutSaturation => {
                write!(f, "soft-start requires saturation bounds")
            }
        }
    }
}

/// Fatal startup failure. The supervisor never retries these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// IMU did not answer or rejected its configuration.
    Imu,
    /// A controller or estimator filter was misconfigured.
    Filter(FilterError),
    /// An executor refused to spawn a task (arena exhausted).
    Spawn,
}

impl From<FilterError> for InitError {
    fn from(err: FilterError) -> Self {
        Self::Filter(err)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imu => write!(f, "IMU initialization failed"),
            Self::Filter(err) => write!(f, "filter configuration: {}", err),
            Self::Spawn => write!(f, "task spawn failed"),
        }
    }
}
