//! Configuration reading and data directory paths.
//!
//! Precedence, lowest first: built-in defaults, `realtime_voice.json` in the
//! data directory (or `$REALTIME_VOICE_CONFIG`), then environment variables
//! (a `.env` file is loaded first if present).

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::SAMPLE_RATE;
use crate::dsp::TransformConfig;
use crate::error::{Result, VoiceError};
use paths::get_data_dir;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/\
     google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Sent as the first text turn. Scopes the assistant to Revolt Motors.
pub const DEFAULT_PERSONA_PROMPT: &str = "your name is Rev and not any else name and you are \
     trained by revolt motors. You are an AI assistant of Revolt Motors. Please respond as Rev \
     would in a helpful and friendly manner and only talk about revolt motors.";

const ENV_API_KEY: &str = "GEMINI_API_KEY";
const ENV_MODEL: &str = "REALTIME_VOICE_MODEL";
const ENV_ENDPOINT: &str = "REALTIME_VOICE_ENDPOINT";
const ENV_CONFIG_PATH: &str = "REALTIME_VOICE_CONFIG";

/// How session events are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFormat {
    #[default]
    Text,
    Json,
}

/// realtime_voice.json shape.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub persona_prompt: String,
    pub pitch_factor: f64,
    pub highpass_cutoff_hz: f32,
    pub headroom: f32,
    pub settle_delay_ms: u64,
    pub carry_filter_state: bool,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub event_format: EventFormat,
    pub log_to_file: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let transform = TransformConfig::default();
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            persona_prompt: DEFAULT_PERSONA_PROMPT.to_string(),
            pitch_factor: transform.pitch_factor,
            highpass_cutoff_hz: transform.highpass_cutoff_hz,
            headroom: transform.headroom,
            settle_delay_ms: 500,
            carry_filter_state: transform.carry_filter_state,
            input_device: None,
            output_device: None,
            event_format: EventFormat::Text,
            log_to_file: false,
        }
    }
}

// The API key stays out of logs.
impl std::fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("pitch_factor", &self.pitch_factor)
            .field("highpass_cutoff_hz", &self.highpass_cutoff_hz)
            .field("headroom", &self.headroom)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("carry_filter_state", &self.carry_filter_state)
            .field("input_device", &self.input_device)
            .field("output_device", &self.output_device)
            .field("event_format", &self.event_format)
            .field("log_to_file", &self.log_to_file)
            .finish_non_exhaustive()
    }
}

impl VoiceConfig {
    /// Overlay environment values. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.model = model;
        }
        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(VoiceError::Config(format!(
                "no API key configured (set {ENV_API_KEY})"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(VoiceError::Config("model must not be empty".into()));
        }
        if !(self.pitch_factor.is_finite() && self.pitch_factor > 0.0) {
            return Err(VoiceError::Config(format!(
                "pitchFactor must be a positive number, got {}",
                self.pitch_factor
            )));
        }
        if !(self.headroom.is_finite() && self.headroom > 0.0) {
            return Err(VoiceError::Config(format!(
                "headroom must be a positive number, got {}",
                self.headroom
            )));
        }
        let nyquist = SAMPLE_RATE as f32 / 2.0;
        if !(self.highpass_cutoff_hz > 0.0 && self.highpass_cutoff_hz < nyquist) {
            return Err(VoiceError::Config(format!(
                "highpassCutoffHz must be between 0 and {nyquist}, got {}",
                self.highpass_cutoff_hz
            )));
        }
        Ok(())
    }

    /// Endpoint with the API key as a query parameter.
    pub fn endpoint_uri(&self) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VoiceError::Config("no API key configured".into()))?;
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}key={}", self.endpoint, sep, key))
    }

    /// Model identifier as the setup descriptor expects it (`models/...`).
    pub fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    pub fn transform_config(&self) -> TransformConfig {
        TransformConfig {
            sample_rate: SAMPLE_RATE,
            pitch_factor: self.pitch_factor,
            highpass_cutoff_hz: self.highpass_cutoff_hz,
            headroom: self.headroom,
            carry_filter_state: self.carry_filter_state,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Load `.env`, the config file and environment overrides, then validate.
pub fn load_config() -> Result<VoiceConfig> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Failed to load .env: {}", e);
        }
    }
    let path = get_config_path();
    let mut config: VoiceConfig = read_json_file(&path).unwrap_or_default();
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Path to realtime_voice.json.
pub fn get_config_path() -> PathBuf {
    match std::env::var_os(ENV_CONFIG_PATH) {
        Some(path) => PathBuf::from(path),
        None => get_data_dir().join("realtime_voice.json"),
    }
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
