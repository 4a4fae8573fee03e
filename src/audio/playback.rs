//! Speaker output via cpal.
//!
//! The stream runs at 16 kHz. Mono is preferred; otherwise any channel
//! count is accepted and each sample is written to every channel. The
//! callback only reads from the lock-free ring buffer and pads underruns
//! with silence.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, SampleFormat, SampleRate, Stream, StreamConfig, SupportedBufferSize,
    SupportedStreamConfigRange,
};
use tracing::{error, info, warn};

use super::{DeviceFaults, PlaybackConsumer, SpeakerSink, BLOCK_SAMPLES, SAMPLE_RATE};
use crate::error::{Result, VoiceError};

/// cpal-backed speaker.
#[derive(Debug, Clone, Default)]
pub struct CpalSpeaker {
    pub device_name: Option<String>,
}

impl CpalSpeaker {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl SpeakerSink for CpalSpeaker {
    type Handle = Stream;

    fn start(self, mut consumer: PlaybackConsumer, faults: DeviceFaults) -> Result<Stream> {
        let device = resolve_output_device(self.device_name.as_deref())?;

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| VoiceError::Device(format!("failed to query output configs: {e}")))?
            .collect();
        let range = select_output_config(ranges).ok_or_else(|| {
            VoiceError::Device(format!("output device does not support {SAMPLE_RATE} Hz f32"))
        })?;

        let buffer_size = buffer_size_for(range.buffer_size());
        let mut config = range.with_sample_rate(SampleRate(SAMPLE_RATE)).config();
        config.buffer_size = buffer_size;
        let channels = usize::from(config.channels);

        info!(
            channels = config.channels,
            sample_rate = SAMPLE_RATE,
            buffer = ?config.buffer_size,
            "Opening output stream"
        );

        let fill = move |data: &mut [f32]| {
            consumer.fill_interleaved(data, channels);
        };
        let stream = build_stream(&device, &config, fill, faults)?;

        stream
            .play()
            .map_err(|e| VoiceError::Device(format!("failed to start output stream: {e}")))?;

        info!("Audio playback started");
        Ok(stream)
    }
}

fn build_stream<F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut fill: F,
    faults: DeviceFaults,
) -> Result<Stream>
where
    F: FnMut(&mut [f32]) + Send + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| fill(data),
            move |err| {
                error!("Audio output stream error: {}", err);
                faults.report(format!("speaker stream failed: {err}"));
            },
            None,
        )
        .map_err(|e| VoiceError::Device(format!("failed to build output stream: {e}")))
}

/// List available output device names.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Named device if present, else the default. A missing named device falls
/// back to the default with a warning.
fn resolve_output_device(device_name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let found = host
            .output_devices()
            .ok()
            .and_then(|mut devices| {
                devices.find(|d| d.name().map(|n| n == name).unwrap_or(false))
            });
        match found {
            Some(device) => {
                info!(device = %name, "Selected output device");
                return Ok(device);
            }
            None => warn!("Output device '{}' not found, using default", name),
        }
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| VoiceError::Device("no default output device available".into()))?;
    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        "Selected output device"
    );
    Ok(device)
}

/// Pick an f32 config covering 16 kHz, mono first, then the fewest channels.
fn select_output_config<I>(ranges: I) -> Option<SupportedStreamConfigRange>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    let target = SampleRate(SAMPLE_RATE);
    ranges
        .into_iter()
        .filter(|c| {
            c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= target
                && c.max_sample_rate() >= target
        })
        .min_by_key(|c| c.channels())
}

/// One block per callback when the device allows it.
fn buffer_size_for(supported: &SupportedBufferSize) -> BufferSize {
    let wanted = BLOCK_SAMPLES as u32;
    match supported {
        SupportedBufferSize::Range { min, max } if *min <= wanted && wanted <= *max => {
            BufferSize::Fixed(wanted)
        }
        _ => BufferSize::Default,
    }
}
