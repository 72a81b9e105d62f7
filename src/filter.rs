//! Discrete IIR filter evaluated from its difference equation.
//!
//! A transfer function
//!
//! ```text
//!          gain · (b0 + b1·z⁻¹ + … + bn·z⁻ⁿ)
//! H(z) = ───────────────────────────────────
//!              a0 + a1·z⁻¹ + … + an·z⁻ⁿ
//! ```
//!
//! is stepped once per sample as
//! `y[k] = (gain·Σ bi·x[k−i] − Σ(i≥1) ai·y[k−i]) / a0`.
//!
//! `N` is the number of coefficients, so the filter order is `N − 1`. Both
//! histories are fixed arrays; stepping never allocates, which keeps the
//! filter usable from the data-ready interrupt context.

use crate::error::FilterError;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Saturation {
    min: f32,
    max: f32,
}

/// Most-recent-first sample history of fixed length `N`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct History<const N: usize> {
    samples: [f32; N],
}

impl<const N: usize> History<N> {
    const fn new() -> Self {
        Self { samples: [0.0; N] }
    }

    fn push(&mut self, value: f32) {
        if N == 0 {
            return;
        }
        self.samples.copy_within(0..N - 1, 1);
        self.samples[0] = value;
    }

    /// Sample `age` steps back; 0 is the newest.
    fn get(&self, age: usize) -> f32 {
        self.samples[age]
    }

    fn clear(&mut self) {
        self.samples = [0.0; N];
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigitalFilter<const N: usize> {
    dt: f32,
    gain: f32,
    num: [f32; N],
    den: [f32; N],
    inputs: History<N>,
    outputs: History<N>,
    saturation: Option<Saturation>,
    saturated: bool,
    soft_start_steps: Option<f32>,
    step: u64,
}

impl<const N: usize> DigitalFilter<N> {
    /// Build a filter with unity gain, zeroed history, and no output limits.
    pub fn new(dt: f32, num: [f32; N], den: [f32; N]) -> Result<Self, FilterError> {
        if N == 0 {
            return Err(FilterError::EmptyCoefficients);
        }
        if !dt.is_finite() || dt <= 0.0 {
            return Err(FilterError::InvalidSampleTime);
        }
        if !den[0].is_finite() || den[0] == 0.0 {
            return Err(FilterError::ZeroLeadingDenominator);
        }

        Ok(Self {
            dt,
            gain: 1.0,
            num,
            den,
            inputs: History::new(),
            outputs: History::new(),
            saturation: None,
            saturated: false,
            soft_start_steps: None,
            step: 0,
        })
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Clamp every output to `[min, max]` and report hits via [`is_saturated`].
    ///
    /// [`is_saturated`]: Self::is_saturated
    pub fn set_saturation(&mut self, min: f32, max: f32) -> Result<(), FilterError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(FilterError::InvalidSaturationBounds);
        }
        self.saturation = Some(Saturation { min, max });
        Ok(())
    }

    /// Ramp the saturation bounds up from zero over `seconds` after each reset.
    pub fn set_soft_start(&mut self, seconds: f32) -> Result<(), FilterError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(FilterError::InvalidSoftStart);
        }
        if self.saturation.is_none() {
            return Err(FilterError::SoftStartWithoutSaturation);
        }
        self.soft_start_steps = Some(seconds / self.dt);
        Ok(())
    }

    /// Advance one sample.
    pub fn step(&mut self, input: f32) -> f32 {
        self.inputs.push(input);

        let mut acc = 0.0;
        for i in 0..N {
            acc += self.gain * self.num[i] * self.inputs.get(i);
        }
        // outputs[0] is still y[k-1] here
        for i in 1..N {
            acc -= self.den[i] * self.outputs.get(i - 1);
        }
        let mut output = acc / self.den[0];

        if let Some(Saturation { min, max }) = self.saturation {
            if output > max {
                output = max;
                self.saturated = true;
            } else if output < min {
                output = min;
                self.saturated = true;
            } else {
                self.saturated = false;
            }

            if let Some(ramp) = self.soft_start_steps {
                let elapsed = self.step as f32;
                if elapsed < ramp {
                    let scale = elapsed / ramp;
                    output = output.clamp(min * scale, max * scale);
                }
            }
        }

        self.outputs.push(output);
        self.step += 1;
        output
    }

    /// True iff the last step was clamped by a hard bound.
    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Zero history and step count; coefficients and limits are kept.
    pub fn reset(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
        self.saturated = false;
        self.step = 0;
    }

    pub fn order(&self) -> usize {
        N - 1
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Steps taken since construction or the last reset.
    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn ramp_steps(&self) -> Option<f32> {
        self.soft_start_steps
    }

    pub fn last_input(&self) -> f32 {
        self.inputs.get(0)
    }

    pub fn last_output(&self) -> f32 {
        self.outputs.get(0)
    }
}
