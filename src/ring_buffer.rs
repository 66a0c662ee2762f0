//! Frame Ring Buffer
//!
//! Bounded, thread-safe store of the most recent frames with drop-oldest
//! eviction. One writer and many readers share it; a single reader/writer lock
//! guards the frames and the counters together so every reader observes a
//! consistent snapshot. Readers receive `Arc` views and never mutate frames in
//! place.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::warn;

use crate::frame::VideoFrame;

/// How often to log a warning about evicted frames
const DROP_LOG_INTERVAL: u64 = 100;

/// Buffer usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BufferStats {
    /// Frames currently held
    pub current_size: usize,
    /// Fixed capacity
    pub capacity: usize,
    /// Total frames ever pushed
    pub total_frames: u64,
    /// Frames evicted to admit newer ones
    pub dropped_frames: u64,
    /// dropped / total, 0.0 when nothing was pushed
    pub drop_rate: f32,
}

struct RingState {
    frames: VecDeque<Arc<VideoFrame>>,
    total_frames: u64,
    dropped_frames: u64,
}

/// Bounded store of the most recent frames, oldest evicted first.
pub struct FrameRingBuffer {
    capacity: usize,
    state: RwLock<RingState>,
}

impl FrameRingBuffer {
    /// Create a buffer holding at most `capacity` frames.
    ///
    /// A zero capacity is clamped to one; an empty ring could never deliver.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: RwLock::new(RingState {
                frames: VecDeque::with_capacity(capacity),
                total_frames: 0,
                dropped_frames: 0,
            }),
        }
    }

    /// Insert a frame at the tail, evicting the oldest when full.
    ///
    /// Never blocks on a consumer; eviction is the backpressure mechanism.
    pub fn push(&self, frame: VideoFrame) {
        let mut state = self.state.write().expect("ring buffer lock poisoned");
        state.total_frames += 1;

        if state.frames.len() >= self.capacity {
            let evicted = state.frames.pop_front();
            state.dropped_frames += 1;

            if state.dropped_frames % DROP_LOG_INTERVAL == 0 {
                let age_ms = evicted
                    .map(|old| frame.timestamp_ns.saturating_sub(old.timestamp_ns) / 1_000_000)
                    .unwrap_or(0);
                warn!(
                    dropped = state.dropped_frames,
                    age_ms, "ring buffer evicting frames faster than consumers read"
                );
            }
        }

        state.frames.push_back(Arc::new(frame));
    }

    /// Most recently pushed frame, without removing it.
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        let state = self.state.read().expect("ring buffer lock poisoned");
        state.frames.back().cloned()
    }

    /// Stored frame whose timestamp is closest to `timestamp_ns`.
    ///
    /// Ties resolve to the more recent sequence number.
    pub fn nearest(&self, timestamp_ns: u64) -> Option<Arc<VideoFrame>> {
        let state = self.state.read().expect("ring buffer lock poisoned");
        state
            .frames
            .iter()
            .min_by(|a, b| {
                let da = a.timestamp_ns.abs_diff(timestamp_ns);
                let db = b.timestamp_ns.abs_diff(timestamp_ns);
                // On equal distance, prefer the larger sequence: reversed
                // sequence order makes min_by keep the newer frame.
                da.cmp(&db).then(b.sequence.cmp(&a.sequence))
            })
            .cloned()
    }

    /// Discard all held frames. Cumulative counters are preserved.
    pub fn clear(&self) {
        let mut state = self.state.write().expect("ring buffer lock poisoned");
        state.frames.clear();
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Usage statistics snapshot
    pub fn stats(&self) -> BufferStats {
        let state = self.state.read().expect("ring buffer lock poisoned");
        BufferStats {
            current_size: state.frames.len(),
            capacity: self.capacity,
            total_frames: state.total_frames,
            dropped_frames: state.dropped_frames,
            drop_rate: if state.total_frames > 0 {
                state.dropped_frames as f32 / state.total_frames as f32
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn frame(sequence: u64, timestamp_ns: u64) -> VideoFrame {
        VideoFrame::new(2, 2, PixelFormat::I420, timestamp_ns, sequence).unwrap()
    }

    #[test]
    fn test_empty_buffer() {
        let ring = FrameRingBuffer::new(4);
        assert!(ring.latest().is_none());
        assert!(ring.nearest(0).is_none());
        assert_eq!(ring.stats(), BufferStats {
            capacity: 4,
            ..Default::default()
        });
    }

    #[test]
    fn test_latest_returns_newest() {
        let ring = FrameRingBuffer::new(4);
        for seq in 1..=3 {
            ring.push(frame(seq, seq * 10));
        }
        assert_eq!(ring.latest().unwrap().sequence, 3);
        // latest() does not remove
        assert_eq!(ring.latest().unwrap().sequence, 3);
        assert_eq!(ring.stats().current_size, 3);
    }

    #[test]
    fn test_drop_oldest_eviction() {
        let capacity = 5;
        let pushed = 12u64;
        let ring = FrameRingBuffer::new(capacity);
        for seq in 1..=pushed {
            ring.push(frame(seq, seq));
        }

        let stats = ring.stats();
        assert_eq!(stats.current_size, capacity);
        assert_eq!(stats.total_frames, pushed);
        assert_eq!(stats.dropped_frames, pushed - capacity as u64);
        assert!((stats.drop_rate - 7.0 / 12.0).abs() < 1e-6);

        // Oldest survivors start right after the evicted prefix
        assert_eq!(ring.nearest(0).unwrap().sequence, pushed - capacity as u64 + 1);
        assert_eq!(ring.latest().unwrap().sequence, pushed);
    }

    #[test]
    fn test_nearest_picks_closest_timestamp() {
        let ring = FrameRingBuffer::new(8);
        ring.push(frame(1, 100));
        ring.push(frame(2, 200));
        ring.push(frame(3, 300));

        assert_eq!(ring.nearest(120).unwrap().sequence, 1);
        assert_eq!(ring.nearest(290).unwrap().sequence, 3);
    }

    #[test]
    fn test_nearest_tie_prefers_newer_sequence() {
        let ring = FrameRingBuffer::new(8);
        ring.push(frame(1, 100));
        ring.push(frame(2, 200));
        // 150 is equidistant from both
        assert_eq!(ring.nearest(150).unwrap().sequence, 2);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let ring = FrameRingBuffer::new(2);
        for seq in 1..=4 {
            ring.push(frame(seq, seq));
        }
        ring.clear();

        let stats = ring.stats();
        assert_eq!(stats.current_size, 0);
        assert_eq!(stats.total_frames, 4);
        assert_eq!(stats.dropped_frames, 2);
        assert!(ring.latest().is_none());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(FrameRingBuffer::new(8));
        let writer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for seq in 1..=500u64 {
                    ring.push(frame(seq, seq));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    let mut last_seen = 0u64;
                    for _ in 0..200 {
                        if let Some(f) = ring.latest() {
                            // Per-reader monotonic sequence ordering
                            assert!(f.sequence >= last_seen);
                            last_seen = f.sequence;
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(ring.stats().total_frames, 500);
    }
}
