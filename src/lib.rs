//! Realtime bidirectional voice client.
//!
//! Streams microphone audio to a conversational speech service over a
//! WebSocket, plays the spoken reply through a fixed signal chain, and
//! gates the microphone while the model is speaking.

pub mod audio;
pub mod config;
pub mod dsp;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod session;
pub mod transport;

pub use error::{Result, VoiceError};
pub use session::{Session, SessionOptions, TextSender};
