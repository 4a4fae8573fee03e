//! Platform-specific data directory paths.
//!
//!   Windows: %APPDATA%/realtime-voice
//!   macOS:   ~/Library/Application Support/realtime-voice
//!   Linux:   $XDG_CONFIG_HOME/realtime-voice (default ~/.config)

use std::path::PathBuf;

const APP_DIR: &str = "realtime-voice";

/// Get the data directory (cross-platform).
pub fn get_data_dir() -> PathBuf {
    get_config_base().join(APP_DIR)
}

/// Directory for rolling log files.
pub fn get_log_dir() -> PathBuf {
    get_data_dir().join("logs")
}

/// Platform config base. `dirs` already honours `XDG_CONFIG_HOME` and
/// resolves Application Support / Roaming AppData on macOS and Windows.
fn get_config_base() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    })
}
