//! FIFO of decoded PCM frames awaiting transformation.
//!
//! Written by the receive loop, read by the transform consumer. `clear`
//! runs under the same lock as `push`, so a flush can never interleave
//! with a half-finished insert.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct PlaybackQueue {
    frames: Mutex<VecDeque<Vec<u8>>>,
    available: Notify,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, frame: Vec<u8>) {
        self.lock().push_back(frame);
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<Vec<u8>> {
        self.lock().pop_front()
    }

    /// Wait for the next frame.
    pub async fn pop(&self) -> Vec<u8> {
        loop {
            let notified = self.available.notified();
            if let Some(frame) = self.try_pop() {
                return frame;
            }
            notified.await;
        }
    }

    /// Drop every queued frame. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut frames = self.lock();
        let dropped = frames.len();
        frames.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
