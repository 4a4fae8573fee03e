//! Error types for the voice session.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type alias for voice session operations.
pub type Result<T> = std::result::Result<T, VoiceError>;

/// Errors that can occur while running a voice session.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Transport unreachable, rejected, or dropped mid-session. Fatal.
    #[error("connection error: {0}")]
    Connection(String),

    /// Setup handshake produced no acknowledgment or an invalid one. Fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Inbound frame that could not be decoded. The stream skips these.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Microphone or speaker unavailable, or its stream failed.
    #[error("audio device error: {0}")]
    Device(String),

    /// Missing credential or invalid parameter.
    #[error("configuration error: {0}")]
    Config(String),

    /// A supervised task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tungstenite::Error> for VoiceError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Connection(err.to_string())
    }
}
