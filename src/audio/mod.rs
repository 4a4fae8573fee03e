//! Audio devices, turn state, and the playback ring buffer.
//!
//! The microphone and speaker are reached through `MicrophoneSource` and
//! `SpeakerSink` so the session can run against cpal devices or test doubles.

pub mod capture;
pub mod playback;
pub mod ring_buffer;
pub mod state;

use tokio::sync::mpsc;

use crate::error::{Result, VoiceError};

pub use capture::{list_input_devices, CaptureGate, CpalMicrophone};
pub use playback::{list_output_devices, CpalSpeaker};
pub use ring_buffer::{playback_ring_buffer, PlaybackConsumer, PlaybackProducer};
pub use state::{TurnState, TurnStateMachine};

/// Sample rate on both sides of the wire.
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per capture block and preferred playback callback size (64 ms).
pub const BLOCK_SAMPLES: usize = 1024;

/// Forwards failures from device callbacks to the session supervisor.
#[derive(Debug, Clone)]
pub struct DeviceFaults {
    tx: mpsc::UnboundedSender<VoiceError>,
}

impl DeviceFaults {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<VoiceError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Safe to call from a realtime callback; never blocks.
    pub fn report(&self, message: impl Into<String>) {
        let _ = self.tx.send(VoiceError::Device(message.into()));
    }
}

/// Something that delivers 16 kHz mono i16 blocks to a `CaptureGate`.
pub trait MicrophoneSource {
    /// Keeps capture running while alive.
    type Handle;

    fn start(self, gate: CaptureGate, faults: DeviceFaults) -> Result<Self::Handle>;
}

/// Something that pulls f32 samples from the playback ring buffer.
pub trait SpeakerSink {
    /// Keeps playback running while alive.
    type Handle;

    fn start(self, consumer: PlaybackConsumer, faults: DeviceFaults) -> Result<Self::Handle>;
}
