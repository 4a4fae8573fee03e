//! Lock-free SPSC ring buffer for playback samples.
//!
//! The transform consumer writes processed f32 samples from a tokio task,
//! and the speaker callback drains them on the realtime audio thread.
//! Neither side takes a lock.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~60 seconds of 16 kHz mono audio.
pub const DEFAULT_CAPACITY: usize = 960_000;

/// Producer half, owned by the transform consumer task.
pub struct PlaybackProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half, lives in the speaker callback.
pub struct PlaybackConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair.
pub fn playback_ring_buffer(capacity: Option<usize>) -> (PlaybackProducer, PlaybackConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let rb = HeapRb::<f32>::new(cap);
    let (prod, cons) = rb.split();
    (
        PlaybackProducer { inner: prod },
        PlaybackConsumer { inner: cons },
    )
}

impl PlaybackProducer {
    /// Push as many samples as fit. Returns the number written.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

impl PlaybackConsumer {
    /// Fill `out` completely: buffered samples first, silence for the rest.
    /// Returns how many real samples were written. Never blocks.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let read = self.inner.pop_slice(out);
        out[read..].fill(0.0);
        read
    }

    /// Fill an interleaved buffer of `channels` channels, duplicating each
    /// mono sample across the frame. Returns real frames written.
    pub fn fill_interleaved(&mut self, out: &mut [f32], channels: usize) -> usize {
        if channels <= 1 {
            return self.fill(out);
        }
        let mut real = 0;
        for frame in out.chunks_mut(channels) {
            let sample = match self.inner.try_pop() {
                Some(s) => {
                    real += 1;
                    s
                }
                None => 0.0,
            };
            frame.fill(sample);
        }
        real
    }

    /// Number of samples currently buffered.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_exact() {
        let (mut prod, mut cons) = playback_ring_buffer(Some(16));
        prod.push_slice(&[0.1, 0.2, 0.3, 0.4]);

        let mut out = [9.0f32; 4];
        assert_eq!(cons.fill(&mut out), 4);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(cons.available(), 0);
    }

    #[test]
    fn test_fill_underrun_pads_with_silence() {
        let (mut prod, mut cons) = playback_ring_buffer(Some(16));
        prod.push_slice(&[0.5, -0.5]);

        let mut out = [9.0f32; 5];
        assert_eq!(cons.fill(&mut out), 2);
        assert_eq!(out, [0.5, -0.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fill_empty_is_all_silence() {
        let (_prod, mut cons) = playback_ring_buffer(Some(16));
        let mut out = [1.0f32; 1024];
        assert_eq!(cons.fill(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_fill_leaves_remainder_buffered() {
        let (mut prod, mut cons) = playback_ring_buffer(Some(16));
        prod.push_slice(&[1.0, 2.0, 3.0]);

        let mut out = [0.0f32; 2];
        cons.fill(&mut out);
        assert_eq!(cons.available(), 1);

        let mut out = [0.0f32; 2];
        assert_eq!(cons.fill(&mut out), 1);
        assert_eq!(out, [3.0, 0.0]);
    }

    #[test]
    fn test_push_reports_partial_write_when_full() {
        let (mut prod, _cons) = playback_ring_buffer(Some(4));
        assert_eq!(prod.push_slice(&[1.0; 6]), 4);
        assert_eq!(prod.push_slice(&[2.0]), 0);
    }

    #[test]
    fn test_fill_interleaved_duplicates_channels() {
        let (mut prod, mut cons) = playback_ring_buffer(Some(16));
        prod.push_slice(&[0.25, 0.75]);

        let mut out = [9.0f32; 6];
        assert_eq!(cons.fill_interleaved(&mut out, 2), 2);
        assert_eq!(out, [0.25, 0.25, 0.75, 0.75, 0.0, 0.0]);
    }
}
