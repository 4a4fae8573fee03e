//! One realtime voice conversation.
//!
//! `Session::establish` performs the handshake (setup descriptor, exactly one
//! acknowledgment, persona prompt). `Session::run` then starts the devices
//! and supervises three tasks until one of them ends, a device reports a
//! fault, or shutdown is requested:
//!
//! - outbound pump: outbound queue -> socket
//! - receive loop: socket -> turn state + playback queue
//! - transform consumer: playback queue -> DSP -> ring buffer

pub mod outbound;
pub mod playback;
pub mod queue;
pub mod receive;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_tungstenite::MaybeTlsStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audio::{
    playback_ring_buffer, CaptureGate, DeviceFaults, MicrophoneSource, SpeakerSink,
    TurnStateMachine,
};
use crate::config::VoiceConfig;
use crate::dsp::{SignalTransform, TransformConfig};
use crate::error::{Result, VoiceError};
use crate::ipc::{EventSender, SessionEvent};
use crate::transport::{Outbound, Transport};
use outbound::run_outbound_pump;
use playback::run_transform_consumer;
use queue::PlaybackQueue;
use receive::{run_receive_loop, ReceiveContext};

/// Per-session parameters derived from `VoiceConfig`.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Model identifier as sent in the setup descriptor.
    pub model: String,
    pub persona_prompt: String,
    pub transform: TransformConfig,
    pub settle_delay: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            model: config.model_path(),
            persona_prompt: config.persona_prompt.clone(),
            transform: config.transform_config(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// Cloneable handle for injecting text turns from outside the session.
#[derive(Debug, Clone)]
pub struct TextSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl TextSender {
    /// Returns `false` once the session is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.tx.send(Outbound::Text(text.into())).is_ok()
    }
}

/// A handshaken connection plus the state shared by the session tasks.
pub struct Session<S> {
    transport: Transport<S>,
    options: SessionOptions,
    turn: Arc<TurnStateMachine>,
    queue: Arc<PlaybackQueue>,
    events: EventSender,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Session<MaybeTlsStream<TcpStream>> {
    /// Connect to the configured endpoint and perform the handshake.
    pub async fn connect(config: &VoiceConfig, events: EventSender) -> Result<Self> {
        let uri = config.endpoint_uri()?;
        let transport =
            Transport::connect(&uri, &[("Content-Type", "application/json")]).await?;
        Self::establish(transport, SessionOptions::from_config(config), events).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Send the setup descriptor, consume its acknowledgment, then prime
    /// the conversation with the persona prompt. No audio is sent before
    /// this returns.
    pub async fn establish(
        mut transport: Transport<S>,
        options: SessionOptions,
        events: EventSender,
    ) -> Result<Self> {
        transport.send_setup(&options.model).await?;
        if !options.persona_prompt.trim().is_empty() {
            transport.send_text(&options.persona_prompt).await?;
        }

        info!(model = %options.model, "Session established");
        events.emit(SessionEvent::Connected {
            model: options.model.clone(),
        });

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            transport,
            options,
            turn: TurnStateMachine::new(),
            queue: Arc::new(PlaybackQueue::new()),
            events,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn text_sender(&self) -> TextSender {
        TextSender {
            tx: self.outbound_tx.clone(),
        }
    }

    pub fn turn_state(&self) -> Arc<TurnStateMachine> {
        Arc::clone(&self.turn)
    }

    /// Run until shutdown, remote close, or the first fatal error.
    ///
    /// Device handles are held on this future's stack and released after
    /// all tasks have been joined.
    pub async fn run<M, K>(self, mic: M, speaker: K, shutdown: CancellationToken) -> Result<()>
    where
        M: MicrophoneSource,
        K: SpeakerSink,
    {
        let Session {
            transport,
            options,
            turn,
            queue,
            events,
            outbound_tx,
            outbound_rx,
        } = self;

        let (faults, mut fault_rx) = DeviceFaults::channel();
        let (producer, consumer) = playback_ring_buffer(None);

        let speaker_handle = speaker.start(consumer, faults.clone())?;
        let gate = CaptureGate::new(Arc::clone(&turn), outbound_tx);
        let capture = gate.clone();
        let mic_handle = mic.start(gate, faults)?;

        let cancel = shutdown.child_token();
        let (writer, reader) = transport.split();

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        tasks.spawn(run_outbound_pump(writer, outbound_rx, cancel.clone()));
        tasks.spawn(run_receive_loop(
            reader.receive(),
            ReceiveContext {
                turn,
                queue: Arc::clone(&queue),
                events: events.clone(),
                settle_delay: options.settle_delay,
            },
            cancel.clone(),
        ));
        tasks.spawn(run_transform_consumer(
            queue,
            SignalTransform::new(options.transform),
            producer,
            cancel.clone(),
        ));

        let mut first_error = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested");
                None
            }
            Some(fault) = fault_rx.recv() => {
                error!(error = %fault, "Audio device failed");
                Some(fault)
            }
            Some(joined) = tasks.join_next() => match flatten(joined) {
                Ok(()) => {
                    info!("Session ended by remote");
                    None
                }
                Err(e) => {
                    error!(error = %e, "Session task failed");
                    Some(e)
                }
            },
        };

        events.emit(SessionEvent::Stopping {});
        cancel.cancel();

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = flatten(joined) {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    warn!(error = %e, "Additional task error during shutdown");
                }
            }
        }

        drop(mic_handle);
        drop(speaker_handle);
        let stats = capture.stats();
        info!(
            blocks_sent = stats.sent.load(Ordering::Relaxed),
            blocks_gated = stats.gated.load(Ordering::Relaxed),
            "Session stopped"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| VoiceError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PlaybackConsumer;
    use crate::transport::tests::{next_json, socket_pair};
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::WebSocketStream;

    type Server = WebSocketStream<DuplexStream>;

    fn options() -> SessionOptions {
        SessionOptions {
            model: "test-model".into(),
            persona_prompt: "persona".into(),
            transform: TransformConfig::default(),
            settle_delay: Duration::from_millis(20),
        }
    }

    #[derive(Clone, Default)]
    struct MockMic {
        gate: Arc<Mutex<Option<CaptureGate>>>,
        initial_block: Option<Vec<i16>>,
    }

    impl MockMic {
        fn submit(&self, block: &[i16]) -> bool {
            self.gate.lock().unwrap().as_ref().unwrap().submit(block)
        }
    }

    impl MicrophoneSource for MockMic {
        type Handle = ();

        fn start(self, gate: CaptureGate, _faults: DeviceFaults) -> Result<()> {
            if let Some(block) = &self.initial_block {
                gate.submit(block);
            }
            *self.gate.lock().unwrap() = Some(gate);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockSpeaker {
        fault: Option<String>,
    }

    impl SpeakerSink for MockSpeaker {
        type Handle = PlaybackConsumer;

        fn start(self, consumer: PlaybackConsumer, faults: DeviceFaults) -> Result<Self::Handle> {
            if let Some(message) = self.fault {
                faults.report(message);
            }
            Ok(consumer)
        }
    }

    /// Server side of the handshake. Returns the setup and persona messages.
    async fn accept(server: &mut Server) -> (Value, Value) {
        let setup = next_json(server).await;
        server
            .send(Message::Text(r#"{"setupComplete": {}}"#.into()))
            .await
            .unwrap();
        let persona = next_json(server).await;
        (setup, persona)
    }

    fn audio_frame(pcm: &[u8]) -> Message {
        let b64 = crate::transport::protocol::encode_pcm(pcm);
        Message::Text(
            json!({"serverContent": {"modelTurn": {"parts": [{"inlineData": {"data": b64}}]}}})
                .to_string(),
        )
    }

    fn turn_complete_frame() -> Message {
        Message::Text(json!({"serverContent": {"turnComplete": true}}).to_string())
    }

    #[tokio::test]
    async fn test_handshake_precedes_audio() {
        let (transport, mut server) = socket_pair().await;
        let (events, mut event_rx) = EventSender::channel();

        let server_task = tokio::spawn(async move {
            let (setup, persona) = accept(&mut server).await;
            let audio = next_json(&mut server).await;
            server.close(None).await.unwrap();
            while server.next().await.is_some() {}
            (setup, persona, audio)
        });

        let session = Session::establish(transport, options(), events).await.unwrap();
        assert_eq!(
            event_rx.recv().await,
            Some(SessionEvent::Connected {
                model: "test-model".into()
            })
        );

        let mic = MockMic {
            initial_block: Some(vec![1, 2]),
            ..MockMic::default()
        };
        session
            .run(mic, MockSpeaker::default(), CancellationToken::new())
            .await
            .unwrap();

        let (setup, persona, audio) = server_task.await.unwrap();
        assert_eq!(setup, json!({"setup": {"model": "test-model"}}));
        assert_eq!(persona, json!({"realtime_input": {"text": "persona"}}));
        assert_eq!(
            audio,
            json!({"realtime_input": {"media_chunks": [{"data": "AQACAA==", "mime_type": "audio/pcm"}]}})
        );
    }

    #[tokio::test]
    async fn test_no_audio_sent_while_model_speaks() {
        let (transport, mut server) = socket_pair().await;
        let (events, mut event_rx) = EventSender::channel();

        let session_fut = Session::establish(transport, options(), events);
        let (session, _) = tokio::join!(session_fut, accept(&mut server));
        let session = session.unwrap();
        let turn = session.turn_state();

        let mic = MockMic::default();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn({
            let mic = mic.clone();
            let shutdown = shutdown.clone();
            async move { session.run(mic, MockSpeaker::default(), shutdown).await }
        });

        server.send(audio_frame(&[0, 1, 0, 2])).await.unwrap();
        while event_rx.recv().await != Some(SessionEvent::ModelStartedSpeaking {}) {}
        assert!(turn.is_model_speaking());
        for _ in 0..10 {
            assert!(!mic.submit(&[7; 1024]));
        }

        server.send(turn_complete_frame()).await.unwrap();
        while event_rx.recv().await != Some(SessionEvent::ReadyForInput {}) {}
        assert!(mic.submit(&[3, 4]));

        // The first audio the server sees is the block sent after the turn.
        let sent = next_json(&mut server).await;
        assert_eq!(
            sent["realtime_input"]["media_chunks"][0]["data"],
            "AwAEAA=="
        );

        shutdown.cancel();
        run.await.unwrap().unwrap();
        while let Some(Ok(msg)) = server.next().await {
            assert!(!msg.is_text(), "unexpected message after shutdown: {msg:?}");
        }
    }

    #[tokio::test]
    async fn test_text_sender_injects_turn() {
        let (transport, mut server) = socket_pair().await;
        let (events, _event_rx) = EventSender::channel();

        let (session, _) = tokio::join!(
            Session::establish(transport, options(), events),
            accept(&mut server)
        );
        let session = session.unwrap();
        let text = session.text_sender();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                session
                    .run(MockMic::default(), MockSpeaker::default(), shutdown)
                    .await
            }
        });

        assert!(text.send("what time is it"));
        assert_eq!(
            next_json(&mut server).await,
            json!({"realtime_input": {"text": "what time is it"}})
        );

        shutdown.cancel();
        run.await.unwrap().unwrap();
        assert!(!text.send("too late"));
    }

    #[tokio::test]
    async fn test_device_fault_ends_session() {
        let (transport, mut server) = socket_pair().await;
        let (events, mut event_rx) = EventSender::channel();

        let (session, _) = tokio::join!(
            Session::establish(transport, options(), events),
            accept(&mut server)
        );
        let speaker = MockSpeaker {
            fault: Some("device unplugged".into()),
        };
        let err = session
            .unwrap()
            .run(MockMic::default(), speaker, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Device(_)), "got {err:?}");

        let mut saw_stopping = false;
        while let Ok(event) = event_rx.try_recv() {
            saw_stopping |= event == SessionEvent::Stopping {};
        }
        assert!(saw_stopping);
    }

    #[tokio::test]
    async fn test_socket_error_cancels_siblings() {
        let (transport, mut server) = socket_pair().await;
        let (events, mut event_rx) = EventSender::channel();

        let (session, _) = tokio::join!(
            Session::establish(transport, options(), events),
            accept(&mut server)
        );
        let session = session.unwrap();
        let text = session.text_sender();
        let run = tokio::spawn(async move {
            session
                .run(MockMic::default(), MockSpeaker::default(), CancellationToken::new())
                .await
        });

        // Peer vanishes without a close frame.
        drop(server);

        let err = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("session did not stop after the socket failed")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, VoiceError::Connection(_)), "got {err:?}");

        let mut saw_stopping = false;
        while let Ok(event) = event_rx.try_recv() {
            saw_stopping |= event == SessionEvent::Stopping {};
        }
        assert!(saw_stopping);
        // The pump was joined and dropped its queue.
        assert!(!text.send("anyone there"));
    }

    #[tokio::test]
    async fn test_establish_fails_without_ack() {
        let (transport, mut server) = socket_pair().await;
        let (events, mut event_rx) = EventSender::channel();

        tokio::spawn(async move {
            let _ = next_json(&mut server).await;
            server.close(None).await.unwrap();
            while server.next().await.is_some() {}
        });

        let result = Session::establish(transport, options(), events).await;
        assert!(matches!(result, Err(VoiceError::Protocol(_))));
        assert!(event_rx.try_recv().is_err());
    }
}
