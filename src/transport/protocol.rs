//! Wire format for the realtime speech service.
//!
//! Outbound (client -> service):
//! - `{"setup": {"model": "..."}}`
//! - `{"realtime_input": {"text": "..."}}`
//! - `{"realtime_input": {"media_chunks": [{"data": "<b64>", "mime_type": "audio/pcm"}]}}`
//!
//! Inbound messages are JSON objects. Only two paths matter here:
//! `serverContent.modelTurn.parts[0].inlineData.data` (base64 PCM) and
//! `serverContent.turnComplete`. Everything else is ignored.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VoiceError};

/// MIME type attached to every outbound audio chunk.
pub const PCM_MIME_TYPE: &str = "audio/pcm";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Messages sent to the service.
#[derive(Debug, Clone, Serialize)]
pub enum ClientMessage {
    #[serde(rename = "setup")]
    Setup { model: String },
    #[serde(rename = "realtime_input")]
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaChunk {
    pub data: String,
    pub mime_type: String,
}

impl ClientMessage {
    pub fn setup(model: &str) -> Self {
        Self::Setup {
            model: model.to_string(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::RealtimeInput(RealtimeInput {
            text: Some(text.to_string()),
            ..RealtimeInput::default()
        })
    }

    /// Wrap raw PCM bytes in a base64 media chunk envelope.
    pub fn audio(pcm: &[u8]) -> Self {
        Self::RealtimeInput(RealtimeInput {
            text: None,
            media_chunks: vec![MediaChunk {
                data: encode_pcm(pcm),
                mime_type: PCM_MIME_TYPE.to_string(),
            }],
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    server_content: Option<ServerContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    turn_complete: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
struct InlineData {
    #[serde(default)]
    data: Option<String>,
}

/// What one inbound message means for the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerEvent {
    /// Decoded PCM from the first part, if it carried any audio.
    pub audio: Option<Vec<u8>>,
    /// The model finished its turn.
    pub turn_complete: bool,
}

impl ServerEvent {
    /// Neither audio nor a turn boundary.
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && !self.turn_complete
    }
}

/// Decode one inbound JSON payload.
///
/// Missing fields are normal and yield an empty event. Invalid JSON or a
/// payload of the wrong shape is `MalformedMessage`. An undecodable audio
/// body only drops the audio; the turn flag still counts.
pub fn decode_server_message(payload: &[u8]) -> Result<ServerEvent> {
    let message: ServerMessage = serde_json::from_slice(payload)
        .map_err(|e| VoiceError::MalformedMessage(e.to_string()))?;

    let Some(content) = message.server_content else {
        return Ok(ServerEvent::default());
    };

    let audio = match content
        .model_turn
        .and_then(|turn| turn.parts.into_iter().next())
        .and_then(|part| part.inline_data)
        .and_then(|inline| inline.data)
    {
        Some(b64) => match decode_pcm(&b64) {
            Ok(pcm) => (!pcm.is_empty()).then_some(pcm),
            Err(e) => {
                debug!(error = %e, "Dropping undecodable audio part");
                None
            }
        },
        None => None,
    };

    Ok(ServerEvent {
        audio,
        turn_complete: content.turn_complete.unwrap_or(false),
    })
}

/// Base64-encode raw PCM bytes.
pub fn encode_pcm(pcm: &[u8]) -> String {
    STANDARD.encode(pcm)
}

/// Decode a base64 PCM payload.
pub fn decode_pcm(b64: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(b64)
        .map_err(|e| VoiceError::MalformedMessage(format!("invalid base64 audio: {e}")))
}
