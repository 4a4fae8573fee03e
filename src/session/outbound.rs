//! Outbound pump: sole owner of the socket write half.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::Result;
use crate::transport::{Outbound, TransportWriter};

/// Upper bound on the close handshake write during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write queued messages in order until `cancel` fires, then send a close
/// frame. A closed queue is not a reason to stop; only cancellation or a
/// write failure ends the pump.
///
/// Every write is raced against `cancel`, so a peer that stops reading
/// cannot hold up shutdown.
pub async fn run_outbound_pump<S>(
    mut writer: TransportWriter<S>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            next = queue.recv() => match next {
                Some(message) => message,
                None => {
                    debug!("Outbound queue closed, waiting for shutdown");
                    cancel.cancelled().await;
                    break Ok(());
                }
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Cancelled while a write was pending");
                break Ok(());
            }
            sent = writer.send_outbound(&message) => {
                if let Err(e) = sent {
                    error!(error = %e, "Outbound send failed");
                    break Err(e);
                }
            }
        }
    };

    if tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await.is_err() {
        debug!("Close frame not written before timeout");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::{next_json, socket_pair, socket_pair_with_capacity};
    use futures_util::StreamExt;
    use serde_json::json;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn test_pump_preserves_order_and_closes() {
        let (transport, mut server) = socket_pair().await;
        let (writer, _reader) = transport.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tx.send(Outbound::Text("hello".into())).unwrap();
        tx.send(Outbound::Audio(vec![1, 2])).unwrap();
        let pump = tokio::spawn(run_outbound_pump(writer, rx, cancel.clone()));

        assert_eq!(
            next_json(&mut server).await,
            json!({"realtime_input": {"text": "hello"}})
        );
        assert_eq!(
            next_json(&mut server).await["realtime_input"]["media_chunks"][0]["data"],
            "AQI="
        );

        drop(tx);
        cancel.cancel();
        pump.await.unwrap().unwrap();
        assert!(matches!(server.next().await, Some(Ok(Message::Close(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_peer_stops_reading() {
        // Tiny pipe and a server that never reads: writes stall quickly.
        let (transport, _server) = socket_pair_with_capacity(4096).await;
        let (writer, _reader) = transport.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        for _ in 0..64 {
            tx.send(Outbound::Audio(vec![0; 2048])).unwrap();
        }
        let pump = tokio::spawn(run_outbound_pump(writer, rx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pump.is_finished());
        cancel.cancel();

        let finished = tokio::time::timeout(Duration::from_secs(3), pump).await;
        assert!(finished.is_ok(), "pump kept writing after cancellation");
        finished.unwrap().unwrap().unwrap();
    }
}
