//! Transform consumer: playback queue -> signal transform -> ring buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::queue::PlaybackQueue;
use crate::audio::PlaybackProducer;
use crate::dsp::SignalTransform;
use crate::error::Result;

/// Poll interval while the ring buffer has no room.
const RING_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Pop frames one at a time, transform them and append to the ring buffer
/// until `cancel` fires. Never drops transformed audio; when the ring is
/// full it waits for the speaker to drain it.
pub async fn run_transform_consumer(
    queue: Arc<PlaybackQueue>,
    mut transform: SignalTransform,
    mut producer: PlaybackProducer,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = queue.pop() => frame,
        };

        let samples = transform.process(&frame);
        trace!(in_bytes = frame.len(), out_samples = samples.len(), "Frame transformed");

        if !write_all(&mut producer, &samples, &cancel).await {
            return Ok(());
        }
    }
}

/// Returns `false` if cancelled before everything was written.
async fn write_all(
    producer: &mut PlaybackProducer,
    samples: &[f32],
    cancel: &CancellationToken,
) -> bool {
    let mut written = producer.push_slice(samples);
    while written < samples.len() {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(RING_FULL_BACKOFF) => {}
        }
        written += producer.push_slice(&samples[written..]);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{playback_ring_buffer, PlaybackConsumer};
    use crate::dsp::{i16_to_pcm_bytes, TransformConfig};

    fn frame(samples: usize) -> Vec<u8> {
        let pcm: Vec<i16> = (0..samples)
            .map(|i| ((i as f32 * 0.3).sin() * 8000.0) as i16)
            .collect();
        i16_to_pcm_bytes(&pcm)
    }

    async fn wait_for(consumer: &PlaybackConsumer, samples: usize) {
        while consumer.available() < samples {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_reach_ring_buffer_shortened() {
        let queue = Arc::new(PlaybackQueue::new());
        let (producer, consumer) = playback_ring_buffer(Some(4096));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_transform_consumer(
            Arc::clone(&queue),
            SignalTransform::new(TransformConfig::default()),
            producer,
            cancel.clone(),
        ));

        queue.push(frame(300));
        queue.push(frame(600));
        wait_for(&consumer, 600).await;
        assert_eq!(consumer.available(), 200 + 400);
        assert!(queue.is_empty());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_space_instead_of_dropping() {
        let queue = Arc::new(PlaybackQueue::new());
        let (producer, mut consumer) = playback_ring_buffer(Some(100));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_transform_consumer(
            Arc::clone(&queue),
            SignalTransform::new(TransformConfig::default()),
            producer,
            cancel.clone(),
        ));

        // 300 input samples -> 200 output samples, twice the ring capacity.
        queue.push(frame(300));
        wait_for(&consumer, 100).await;

        let mut out = vec![0.0f32; 100];
        let mut total = consumer.fill(&mut out);
        wait_for(&consumer, 100).await;
        total += consumer.fill(&mut out);
        assert_eq!(total, 200);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_ring_full() {
        let queue = Arc::new(PlaybackQueue::new());
        let (producer, consumer) = playback_ring_buffer(Some(10));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_transform_consumer(
            Arc::clone(&queue),
            SignalTransform::new(TransformConfig::default()),
            producer,
            cancel.clone(),
        ));

        queue.push(frame(300));
        wait_for(&consumer, 10).await;
        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
