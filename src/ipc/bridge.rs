//! stdout event emitter and stdin command reader.
//!
//! Commands are read on a blocking thread and forwarded through an mpsc
//! channel. Events go to stdout either as JSON lines or as plain text.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{SessionEvent, VoiceCommand};
use crate::config::EventFormat;

/// Emit a `SessionEvent` on stdout in the requested format and flush.
pub fn emit_event(event: &SessionEvent, format: EventFormat) {
    let line = match format {
        EventFormat::Json => match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to serialize event: {}", e);
                return;
            }
        },
        EventFormat::Text => event.display_line(),
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Pipe may be closed; nothing to do about it.
    let _ = writeln!(handle, "{}", line);
    let _ = handle.flush();
}

/// Parse one stdin line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<VoiceCommand>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

/// Spawn a blocking thread that reads JSON command lines from stdin.
///
/// Invalid lines are reported as `Error` events through `events` and
/// otherwise ignored. The thread exits on EOF, read error, or when the
/// receiver is dropped.
pub fn spawn_stdin_reader(
    events: super::EventSender,
) -> mpsc::UnboundedReceiver<VoiceCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => match parse_command(&text) {
                    Ok(Some(cmd)) => {
                        debug!(?cmd, "Received command");
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        error!("Invalid JSON command: {} (input: {})", e, text.trim());
                        events.emit(SessionEvent::Error {
                            message: format!("Invalid JSON command: {}", e),
                        });
                    }
                },
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break;
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_blank() {
        assert!(parse_command("   ").unwrap().is_none());
    }

    #[test]
    fn test_parse_command_text() {
        let cmd = parse_command(r#"  {"command": "text", "text": "hello"}  "#).unwrap();
        assert_eq!(
            cmd,
            Some(VoiceCommand::Text {
                text: "hello".into()
            })
        );
    }

    #[test]
    fn test_parse_command_invalid() {
        assert!(parse_command("{not json").is_err());
    }
}
