//! WebSocket transport to the realtime speech service.
//!
//! `Transport` owns the socket through the setup handshake. After that it
//! is split: the writer half goes to the outbound pump, and the reader half
//! becomes a lazy stream of decoded `ServerEvent`s.

pub mod protocol;

use futures_util::future;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{Result, VoiceError};
use protocol::{decode_server_message, ClientMessage, ServerEvent};

/// Payloads waiting for the writer half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text turn (persona prompt or an injected command).
    Text(String),
    /// One block of 16 kHz mono PCM16 little-endian audio.
    Audio(Vec<u8>),
}

/// Transport over a TCP (optionally TLS) connection.
pub type TcpTransport = Transport<MaybeTlsStream<TcpStream>>;

/// The service's reply to the setup descriptor.
#[derive(Debug, Clone)]
pub struct SetupAck {
    pub raw: serde_json::Value,
}

impl SetupAck {
    fn parse(payload: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| VoiceError::Protocol(format!("invalid setup acknowledgment: {e}")))?;
        if !raw.is_object() {
            return Err(VoiceError::Protocol(
                "setup acknowledgment is not a JSON object".into(),
            ));
        }
        Ok(Self { raw })
    }

    /// Whether the service used the explicit `setupComplete` marker.
    pub fn is_setup_complete(&self) -> bool {
        self.raw.get("setupComplete").is_some()
    }
}

/// A connected socket that has not been split yet.
pub struct Transport<S> {
    ws: WebSocketStream<S>,
}

impl Transport<MaybeTlsStream<TcpStream>> {
    /// Open the WebSocket. `uri` may carry credentials, so it is never logged.
    pub async fn connect(uri: &str, headers: &[(&str, &str)]) -> Result<Self> {
        let mut request = uri
            .into_client_request()
            .map_err(|e| VoiceError::Connection(format!("invalid endpoint: {e}")))?;

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| VoiceError::Connection(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| VoiceError::Connection(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let host = request.uri().host().unwrap_or("unknown").to_string();
        let (ws, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| VoiceError::Connection(format!("failed to connect to {host}: {e}")))?;

        info!(host = %host, status = %response.status(), "WebSocket connected");
        Ok(Self { ws })
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-established WebSocket.
    pub fn from_stream(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }

    /// Send the setup descriptor and wait for exactly one acknowledgment.
    ///
    /// Control frames do not count as the acknowledgment. A close, end of
    /// stream, or non-JSON reply is a `Protocol` error.
    pub async fn send_setup(&mut self, model: &str) -> Result<SetupAck> {
        self.send(&ClientMessage::setup(model)).await?;
        debug!(model, "Setup sent, waiting for acknowledgment");

        loop {
            let ack = match self.ws.next().await {
                Some(Ok(Message::Text(text))) => SetupAck::parse(text.as_bytes())?,
                Some(Ok(Message::Binary(bytes))) => SetupAck::parse(&bytes)?,
                Some(Ok(Message::Close(frame))) => {
                    return Err(VoiceError::Protocol(format!(
                        "connection closed before setup acknowledgment ({frame:?})"
                    )));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(VoiceError::Protocol(
                        "connection ended before setup acknowledgment".into(),
                    ));
                }
            };
            info!(setup_complete = ack.is_setup_complete(), "Setup acknowledged");
            return Ok(ack);
        }
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(&ClientMessage::text(text)).await
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        self.ws.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    /// Split into independently owned write and read halves.
    pub fn split(self) -> (TransportWriter<S>, TransportReader<S>) {
        let (sink, stream) = self.ws.split();
        (TransportWriter { sink }, TransportReader { stream })
    }
}

/// Write half. Owned by a single task.
pub struct TransportWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> TransportWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        self.sink.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(&ClientMessage::text(text)).await
    }

    pub async fn send_audio_chunk(&mut self, pcm: &[u8]) -> Result<()> {
        self.send(&ClientMessage::audio(pcm)).await
    }

    pub async fn send_outbound(&mut self, outbound: &Outbound) -> Result<()> {
        match outbound {
            Outbound::Text(text) => self.send_text(text).await,
            Outbound::Audio(pcm) => self.send_audio_chunk(pcm).await,
        }
    }

    /// Send a close frame. Errors are ignored; the peer may already be gone.
    pub async fn close(mut self) {
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Close frame not delivered");
        }
    }
}

/// Read half.
pub struct TransportReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> TransportReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Lazy stream of decoded inbound messages.
    ///
    /// Malformed messages and control frames are skipped. The stream ends
    /// when the connection closes normally; other socket failures surface
    /// once as `Connection` errors.
    pub fn receive(self) -> impl Stream<Item = Result<ServerEvent>> + Unpin {
        self.stream.filter_map(|frame| future::ready(decode_frame(frame)))
    }
}

fn decode_frame(
    frame: std::result::Result<Message, tungstenite::Error>,
) -> Option<Result<ServerEvent>> {
    match frame {
        Ok(Message::Text(text)) => decode_payload(text.as_bytes()),
        Ok(Message::Binary(bytes)) => decode_payload(&bytes),
        Ok(Message::Close(frame)) => {
            info!(?frame, "Server closed the connection");
            None
        }
        Ok(_) => None,
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => None,
        Err(e) => Some(Err(e.into())),
    }
}

fn decode_payload(payload: &[u8]) -> Option<Result<ServerEvent>> {
    match decode_server_message(payload) {
        Ok(event) => Some(Ok(event)),
        Err(e) => {
            debug!(error = %e, "Skipping malformed message");
            None
        }
    }
}
