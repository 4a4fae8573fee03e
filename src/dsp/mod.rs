//! Signal transform engine for inbound speech frames.
//!
//! Each PCM chunk from the remote model goes through the same fixed chain
//! before it reaches the playback ring buffer:
//!
//! 1. i16 PCM -> f32 in [-1, 1]
//! 2. peak normalization with headroom
//! 3. first-order high-pass (bass cut)
//! 4. Fourier resample to `len / pitch_factor` samples, which raises the
//!    pitch when played back at the unchanged device rate

pub mod filter;
pub mod resample;

use tracing::debug;

use crate::audio::SAMPLE_RATE;
use filter::HighPassFilter;
use resample::FourierResampler;

/// Parameters for the transform chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    pub sample_rate: u32,
    /// Resampling divisor. > 1.0 shortens the chunk and raises pitch.
    pub pitch_factor: f64,
    pub highpass_cutoff_hz: f32,
    /// Peak is normalized to `1 / headroom`.
    pub headroom: f32,
    /// Carry the high-pass delay line across chunks instead of resetting
    /// it for each one.
    pub carry_filter_state: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            pitch_factor: 1.5,
            highpass_cutoff_hz: 300.0,
            headroom: 1.1,
            carry_filter_state: false,
        }
    }
}

/// Stateful wrapper around the transform chain.
///
/// The only state carried between calls is the FFT plan cache and, when
/// `carry_filter_state` is set, the filter delay line.
pub struct SignalTransform {
    config: TransformConfig,
    highpass: HighPassFilter,
    resampler: FourierResampler,
}

impl SignalTransform {
    pub fn new(config: TransformConfig) -> Self {
        let highpass = HighPassFilter::new(config.highpass_cutoff_hz, config.sample_rate);
        Self {
            config,
            highpass,
            resampler: FourierResampler::new(),
        }
    }

    /// Run one raw PCM chunk through the full chain.
    pub fn process(&mut self, pcm: &[u8]) -> Vec<f32> {
        let mut samples = pcm16_to_f32(pcm);
        if samples.is_empty() {
            return samples;
        }

        peak_normalize(&mut samples, self.config.headroom);

        if !self.config.carry_filter_state {
            self.highpass.reset();
        }
        self.highpass.process(&mut samples);

        let target = pitch_target_len(samples.len(), self.config.pitch_factor);
        let out = self.resampler.resample(&samples, target);
        debug!(input = samples.len(), output = out.len(), "Transformed chunk");
        out
    }
}

/// Decode little-endian i16 PCM into f32 samples (divide by 32768).
/// A trailing odd byte is ignored.
pub fn pcm16_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect()
}

/// Encode i16 samples as little-endian PCM bytes.
pub fn i16_to_pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Scale so the loudest sample becomes `1 / headroom`. Silence is untouched.
pub fn peak_normalize(samples: &mut [f32], headroom: f32) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let divisor = peak * headroom;
        for s in samples.iter_mut() {
            *s /= divisor;
        }
    }
}

/// Output length for a pitch-adjusted chunk: `floor(len / pitch_factor)`.
pub fn pitch_target_len(len: usize, pitch_factor: f64) -> usize {
    (len as f64 / pitch_factor).floor() as usize
}
