//! First-order Butterworth high-pass filter.
//!
//! Coefficients come from the bilinear transform of `s / (s + wc)` with
//! prewarping, the same design as a first-order digital Butterworth with
//! the cutoff expressed as a fraction of Nyquist.

use std::f64::consts::PI;

/// Causal first-order high-pass (transposed direct form II).
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    b0: f32,
    b1: f32,
    a1: f32,
    /// Single delay element.
    z: f32,
}

impl HighPassFilter {
    /// `cutoff_hz` must lie strictly between 0 and `sample_rate / 2`.
    pub fn new(cutoff_hz: f32, sample_rate: u32) -> Self {
        let nyquist = f64::from(sample_rate) / 2.0;
        let wn = f64::from(cutoff_hz) / nyquist;
        let k = (PI * wn / 2.0).tan();
        let norm = 1.0 / (1.0 + k);

        Self {
            b0: norm as f32,
            b1: -norm as f32,
            a1: ((k - 1.0) * norm) as f32,
            z: 0.0,
        }
    }

    /// Filter `samples` in place, forward only.
    pub fn process(&mut self, samples: &mut [f32]) {
        for x in samples.iter_mut() {
            let input = *x;
            let y = self.b0 * input + self.z;
            self.z = self.b1 * input - self.a1 * y;
            *x = y;
        }
    }

    /// Clear the delay line so the next call starts from rest.
    pub fn reset(&mut self) {
        self.z = 0.0;
    }

    /// `(b, a)` coefficient pairs.
    #[cfg(test)]
    pub fn coefficients(&self) -> ([f32; 2], [f32; 2]) {
        ([self.b0, self.b1], [1.0, self.a1])
    }
}
