//! Inbound half of the turn protocol.
//!
//! Sole mutator of the turn state and sole producer into the playback
//! queue. The first audio payload of a turn closes the capture gate; an
//! explicit `turnComplete` starts the settle timer, after which the queue
//! is flushed and the gate reopens.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::queue::PlaybackQueue;
use crate::audio::TurnStateMachine;
use crate::error::Result;
use crate::ipc::{EventSender, SessionEvent};
use crate::transport::protocol::ServerEvent;

/// Shared handles the receive loop works on.
#[derive(Debug, Clone)]
pub struct ReceiveContext {
    pub turn: Arc<TurnStateMachine>,
    pub queue: Arc<PlaybackQueue>,
    pub events: EventSender,
    pub settle_delay: Duration,
}

/// Drive the turn state from inbound messages until the stream ends, an
/// error surfaces, or `cancel` fires.
///
/// A normal end of stream (remote close) returns `Ok`.
pub async fn run_receive_loop<St>(
    mut messages: St,
    ctx: ReceiveContext,
    cancel: CancellationToken,
) -> Result<()>
where
    St: Stream<Item = Result<ServerEvent>> + Unpin,
{
    let mut settle: Option<Instant> = None;

    loop {
        let deadline = settle;
        let settle_elapsed = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => return Ok(()),

            _ = settle_elapsed => {
                settle = None;
                ctx.finish_turn();
            }

            next = messages.next() => match next {
                Some(Ok(event)) => ctx.handle(event, &mut settle),
                Some(Err(e)) => return Err(e),
                None => {
                    info!("Inbound stream ended");
                    return Ok(());
                }
            },
        }
    }
}

impl ReceiveContext {
    fn handle(&self, event: ServerEvent, settle: &mut Option<Instant>) {
        if event.is_empty() {
            trace!("Server message without audio or turn boundary");
            return;
        }

        if let Some(audio) = event.audio {
            if settle.is_some() {
                debug!(bytes = audio.len(), "Discarding audio received while settling");
            } else {
                if self.turn.begin_speaking() {
                    info!("Model started speaking");
                    self.events.emit(SessionEvent::ModelStartedSpeaking {});
                }
                self.queue.push(audio);
            }
        }

        if event.turn_complete {
            if settle.is_some() {
                debug!("Ignoring repeated turnComplete while settling");
            } else {
                info!(state = %self.turn.current(), "Turn complete");
                self.events.emit(SessionEvent::TurnComplete {});
                *settle = Some(Instant::now() + self.settle_delay);
            }
        }
    }

    fn finish_turn(&self) {
        let flushed = self.queue.clear();
        self.turn.finish_speaking();
        info!(flushed, "Ready for next input");
        self.events.emit(SessionEvent::ReadyForInput {});
    }
}
