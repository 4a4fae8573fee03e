//! Session events and control commands.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (stdout).
//! Commands use `{"command": "<name>", ...}` format (stdin).

pub mod bridge;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Events: session -> stdout
// ---------------------------------------------------------------------------

/// Notifications emitted while the session runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Connected { model: String },
    ModelStartedSpeaking {},
    TurnComplete {},
    ReadyForInput {},
    Pong {},
    Stopping {},
    Error { message: String },
}

impl SessionEvent {
    /// Human-readable line for the console output mode.
    pub fn display_line(&self) -> String {
        match self {
            Self::Connected { model } => {
                format!("Connected to {model}. You can start talking now.")
            }
            Self::ModelStartedSpeaking {} => "Model started speaking".to_string(),
            Self::TurnComplete {} => "End of turn".to_string(),
            Self::ReadyForInput {} => "Ready for next input".to_string(),
            Self::Pong {} => "pong".to_string(),
            Self::Stopping {} => "Stopping session".to_string(),
            Self::Error { message } => format!("Error: {message}"),
        }
    }
}

/// Cloneable handle for emitting `SessionEvent`s.
///
/// Sending never blocks. Events are dropped once the listener is gone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Commands: stdin -> session
// ---------------------------------------------------------------------------

/// Control commands read as JSON lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommand {
    /// Inject a text input into the conversation.
    Text { text: String },
    Ping {},
    Stop {},
}
