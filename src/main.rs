//! realtime-voice: talk to a realtime speech model from the terminal.
//!
//! Session events go to stdout (text or JSON lines), control commands are
//! read from stdin as JSON lines, and logs go to stderr.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use realtime_voice::audio::{list_input_devices, list_output_devices, CpalMicrophone, CpalSpeaker};
use realtime_voice::config::load_config;
use realtime_voice::ipc::bridge::{emit_event, spawn_stdin_reader};
use realtime_voice::ipc::{EventSender, SessionEvent, VoiceCommand};
use realtime_voice::{logging, Session, TextSender};

/// How long to wait for queued events to reach stdout on exit.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--list-devices") {
        print_devices();
        return;
    }

    if let Err(e) = run().await {
        error!("{:#}", e);
        eprintln!("realtime-voice: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = tracing::subscriber::with_default(logging::bootstrap_subscriber(), load_config)
        .context("failed to load configuration")?;
    logging::init(config.log_to_file).context("failed to initialize logging")?;
    info!(?config, "Configuration loaded");

    let (events, mut event_rx) = EventSender::channel();
    let format = config.event_format;
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            emit_event(&event, format);
        }
    });

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                shutdown.cancel();
            }
        }
    });

    let result = async {
        let session = Session::connect(&config, events.clone())
            .await
            .context("failed to start session")?;

        let commands = spawn_stdin_reader(events.clone());
        let command_task = tokio::spawn(handle_commands(
            commands,
            session.text_sender(),
            events.clone(),
            shutdown.clone(),
        ));

        let mic = CpalMicrophone::new(config.input_device.clone());
        let speaker = CpalSpeaker::new(config.output_device.clone());
        let outcome = session.run(mic, speaker, shutdown.clone()).await;
        command_task.abort();
        outcome.context("session failed")
    }
    .await;

    if let Err(e) = &result {
        events.emit(SessionEvent::Error {
            message: format!("{e:#}"),
        });
    }

    // The stdin thread keeps its own sender, so the printer cannot be
    // joined; give it a bounded window to flush instead.
    drop(events);
    let _ = tokio::time::timeout(EVENT_DRAIN_TIMEOUT, printer).await;

    info!("realtime-voice exiting");
    result
}

/// Dispatch stdin commands. Stdin closing is not a shutdown signal.
async fn handle_commands(
    mut commands: mpsc::UnboundedReceiver<VoiceCommand>,
    text: TextSender,
    events: EventSender,
    shutdown: CancellationToken,
) {
    while let Some(command) = commands.recv().await {
        match command {
            VoiceCommand::Text { text: input } => {
                info!(chars = input.chars().count(), "Injecting text turn");
                if !text.send(input) {
                    break;
                }
            }
            VoiceCommand::Ping {} => events.emit(SessionEvent::Pong {}),
            VoiceCommand::Stop {} => {
                info!("Stop requested");
                shutdown.cancel();
                break;
            }
        }
    }
    debug!("Command handler exiting");
}

fn print_devices() {
    println!("Input devices:");
    for name in list_input_devices() {
        println!("  {name}");
    }
    println!("Output devices:");
    for name in list_output_devices() {
        println!("  {name}");
    }
}
