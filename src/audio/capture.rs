//! Microphone capture via cpal.
//!
//! Opens the default (or named) input device at its native config,
//! downmixes to mono, resamples to 16 kHz if needed, converts to i16 and
//! hands exact 1024-sample blocks to the `CaptureGate`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{error, info};

use super::{DeviceFaults, MicrophoneSource, TurnStateMachine, BLOCK_SAMPLES, SAMPLE_RATE};
use crate::dsp::i16_to_pcm_bytes;
use crate::error::{Result, VoiceError};
use crate::transport::Outbound;

/// The capture side of the echo gate.
///
/// Called from the microphone callback thread. While the model is speaking
/// every block is dropped on the floor; otherwise it is queued for the
/// outbound pump. Never blocks.
#[derive(Debug, Clone)]
pub struct CaptureGate {
    turn: Arc<TurnStateMachine>,
    outbound: mpsc::UnboundedSender<Outbound>,
    stats: Arc<CaptureStats>,
}

#[derive(Debug, Default)]
pub struct CaptureStats {
    pub sent: AtomicU64,
    pub gated: AtomicU64,
}

impl CaptureGate {
    pub fn new(turn: Arc<TurnStateMachine>, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            turn,
            outbound,
            stats: Arc::new(CaptureStats::default()),
        }
    }

    /// Offer one block. Returns `true` if it was queued for sending.
    pub fn submit(&self, block: &[i16]) -> bool {
        if self.turn.is_model_speaking() {
            self.stats.gated.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let queued = self
            .outbound
            .send(Outbound::Audio(i16_to_pcm_bytes(block)))
            .is_ok();
        if queued {
            self.stats.sent.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }
}

/// Re-chunks arbitrary callback buffers into fixed-size blocks.
#[derive(Debug)]
pub struct BlockAccumulator {
    buf: Vec<i16>,
    block: usize,
}

impl BlockAccumulator {
    pub fn new(block: usize) -> Self {
        Self {
            buf: Vec::with_capacity(block * 2),
            block,
        }
    }

    /// Append `samples` and call `emit` once per completed block.
    pub fn push<F: FnMut(&[i16])>(&mut self, samples: &[i16], mut emit: F) {
        self.buf.extend_from_slice(samples);
        let full = self.buf.len() / self.block * self.block;
        for block in self.buf[..full].chunks_exact(self.block) {
            emit(block);
        }
        self.buf.drain(..full);
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// cpal-backed microphone.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    pub device_name: Option<String>,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl MicrophoneSource for CpalMicrophone {
    type Handle = Stream;

    fn start(self, gate: CaptureGate, faults: DeviceFaults) -> Result<Stream> {
        let cfg = resolve_device(self.device_name.as_deref())?;
        let native_rate = cfg.stream_config.sample_rate.0;
        let channels = cfg.stream_config.channels;

        let mut blocks = BlockAccumulator::new(BLOCK_SAMPLES);

        let stream = cfg
            .device
            .build_input_stream(
                &cfg.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if channels > 1 {
                        to_mono(data, channels)
                    } else {
                        data.to_vec()
                    };
                    let resampled = if native_rate != SAMPLE_RATE {
                        resample_linear(&mono, native_rate, SAMPLE_RATE)
                    } else {
                        mono
                    };
                    let pcm: Vec<i16> = resampled.iter().map(|&s| f32_to_i16(s)).collect();
                    blocks.push(&pcm, |block| {
                        gate.submit(block);
                    });
                },
                move |err| {
                    error!("Audio input stream error: {}", err);
                    faults.report(format!("microphone stream failed: {err}"));
                },
                None,
            )
            .map_err(|e| VoiceError::Device(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| VoiceError::Device(format!("failed to start input stream: {e}")))?;

        info!("Audio capture started");
        Ok(stream)
    }
}

/// List available input device names.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

struct CaptureConfig {
    device: cpal::Device,
    stream_config: StreamConfig,
}

fn resolve_device(device_name: Option<&str>) -> Result<CaptureConfig> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| VoiceError::Device(format!("failed to enumerate input devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| VoiceError::Device(format!("input device not found: {name}")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| VoiceError::Device("no default input device available".into()))?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(|e| VoiceError::Device(format!("failed to get default input config: {e}")))?;

    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate = stream_config.sample_rate.0,
        channels = stream_config.channels,
        "Input device config (will convert to {}Hz mono i16)",
        SAMPLE_RATE,
    );

    Ok(CaptureConfig {
        device,
        stream_config,
    })
}

/// Linear resampler for mono f32.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_len = (input.len() as f64 / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let s0 = input.get(idx).copied().unwrap_or(0.0);
            let s1 = input.get(idx + 1).copied().unwrap_or(s0);
            s0 + frac * (s1 - s0)
        })
        .collect()
}

/// Average interleaved channels down to mono.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels);
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
