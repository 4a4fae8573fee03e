//! Tracing setup.
//!
//! Console output always goes to stderr (stdout carries session events).
//! With `logToFile`, a daily rolling file in `<data dir>/logs` is added.

use std::fs;

use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::paths::get_log_dir;
use crate::error::{Result, VoiceError};

const DEFAULT_FILTER: &str = "info,tungstenite=warn,tokio_tungstenite=warn,cpal=warn";

/// `RUST_LOG` if set, otherwise `info` with the transport crates capped.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Console-only subscriber for use before the config is known.
pub fn bootstrap_subscriber() -> impl Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(log_to_file: bool) -> Result<()> {
    let file_layer = if log_to_file {
        let log_dir = get_log_dir();
        fs::create_dir_all(&log_dir).map_err(|e| {
            VoiceError::Config(format!("cannot create {}: {e}", log_dir.display()))
        })?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("realtime-voice")
            .filename_suffix("log")
            .max_log_files(5)
            .build(&log_dir)
            .map_err(|e| VoiceError::Config(format!("cannot open log file: {e}")))?;

        Some(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        None
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| VoiceError::Config(format!("logger already initialized: {e}")))?;

    tracing::info!(log_to_file, log_dir = %get_log_dir().display(), "Logger initialized");
    Ok(())
}
