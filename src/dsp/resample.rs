//! Fourier-domain resampling.
//!
//! Truncates or zero-pads the spectrum of the whole chunk, then inverts at
//! the target length. The Nyquist bin is doubled when downsampling and
//! halved when upsampling so the even-length spectra stay consistent.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Resamples whole chunks to an arbitrary target length.
///
/// Keeps an `FftPlanner` around so repeated chunk sizes reuse their plans.
pub struct FourierResampler {
    planner: FftPlanner<f32>,
}

impl FourierResampler {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Resample `input` to exactly `num` samples.
    pub fn resample(&mut self, input: &[f32], num: usize) -> Vec<f32> {
        let nx = input.len();
        if nx == 0 || num == 0 {
            return Vec::new();
        }
        if num == nx {
            return input.to_vec();
        }

        let mut spectrum: Vec<Complex<f32>> =
            input.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.planner.plan_fft_forward(nx).process(&mut spectrum);

        // Positive half of the output spectrum, Nyquist included.
        let n = num.min(nx);
        let keep = n / 2 + 1;
        let mut half = vec![Complex::new(0.0f32, 0.0); num / 2 + 1];
        half[..keep].copy_from_slice(&spectrum[..keep]);

        if n % 2 == 0 {
            if num < nx {
                half[n / 2] = half[n / 2].scale(2.0);
            } else {
                half[n / 2] = half[n / 2].scale(0.5);
            }
        }

        // Rebuild the Hermitian spectrum so the inverse is real.
        let mut full = vec![Complex::new(0.0f32, 0.0); num];
        full[0] = Complex::new(half[0].re, 0.0);
        for (k, bin) in half.iter().enumerate().skip(1) {
            if num % 2 == 0 && k == num / 2 {
                full[k] = Complex::new(bin.re, 0.0);
            } else {
                full[k] = *bin;
                full[num - k] = bin.conj();
            }
        }
        self.planner.plan_fft_inverse(num).process(&mut full);

        let scale = 1.0 / nx as f32;
        full.iter().map(|c| c.re * scale).collect()
    }
}

impl Default for FourierResampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_output_length() {
        let mut rs = FourierResampler::new();
        let input = vec![0.1f32; 1024];
        assert_eq!(rs.resample(&input, 682).len(), 682);
        assert_eq!(rs.resample(&input, 2048).len(), 2048);
    }

    #[test]
    fn test_empty_cases() {
        let mut rs = FourierResampler::new();
        assert!(rs.resample(&[], 10).is_empty());
        assert!(rs.resample(&[0.5], 0).is_empty());
    }

    #[test]
    fn test_same_length_is_identity() {
        let mut rs = FourierResampler::new();
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(rs.resample(&input, 3), input);
    }

    #[test]
    fn test_dc_is_preserved() {
        let mut rs = FourierResampler::new();
        let out = rs.resample(&[0.25f32; 900], 600);
        for s in out {
            assert!((s - 0.25).abs() < 1e-4, "sample = {s}");
        }
    }

    #[test]
    fn test_low_frequency_sine_keeps_amplitude() {
        let mut rs = FourierResampler::new();
        // Four full periods over the chunk, well below the new Nyquist.
        let input: Vec<f32> = (0..1200)
            .map(|i| (2.0 * PI * 4.0 * i as f32 / 1200.0).sin())
            .collect();
        let out = rs.resample(&input, 800);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 1.0).abs() < 0.01, "peak = {peak}");
        // Still four periods: sample at a quarter period should be ~1.
        assert!((out[50] - 1.0).abs() < 0.01, "out[50] = {}", out[50]);
    }
}
