//! Stream Receiver
//!
//! Owns the connection lifecycle to the remote stream: a dedicated worker
//! thread opens decode sessions, pulls raw frames and pushes them into the
//! ring buffer, and reconnects with a growing, bounded delay when the stream
//! fails. Decode and connection errors are recovered here and never surface to
//! callers; connection state and counters are the only outward signals.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decoder::{DecodedFrame, SessionAbort, StreamDecoder};
use crate::error::FrameError;
use crate::frame::VideoFrame;
use crate::ring_buffer::FrameRingBuffer;

/// Connection lifecycle state
///
/// `Disconnected` and `Failed` are terminal until an explicit `connect()`
/// call; `Streaming` is the only state producing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected, no worker running
    Disconnected,
    /// Opening a decode session
    Connecting,
    /// Session open, frames flowing
    Streaming,
    /// Waiting out the backoff delay before the next attempt
    ReconnectWait,
    /// Retry budget exhausted; waiting for an explicit reconnect
    Failed,
}

/// Reconnection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Give up and enter `Failed` after this many consecutive failed attempts
    pub max_attempts: u32,
    /// Delay before attempt k is `base_delay * k`, capped at `max_delay`
    pub base_delay: Duration,
    /// Upper bound on the backoff delay
    pub max_delay: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReceiverConfig {
    /// Backoff delay before attempt `attempt` (1-based).
    ///
    /// Monotonic non-decreasing in the attempt number and bounded above.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }
}

struct Shared {
    running: AtomicBool,
    state: Mutex<ConnectionState>,
    abort: Mutex<Option<Arc<dyn SessionAbort>>>,
    sleep_lock: Mutex<()>,
    wake: Condvar,
    sequence: AtomicU64,
    malformed_frames: AtomicU64,
    epoch: Instant,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("receiver state lock poisoned") = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().expect("receiver state lock poisoned")
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning early when `disconnect()` wakes us.
    fn interruptible_sleep(&self, duration: Duration) {
        let guard = self.sleep_lock.lock().expect("receiver sleep lock poisoned");
        let _unused = self
            .wake
            .wait_timeout_while(guard, duration, |_| self.is_running())
            .expect("receiver sleep lock poisoned");
    }
}

/// Receives the remote stream and feeds the ring buffer.
///
/// The worker thread blocks on the decode session; `disconnect()` interrupts
/// it through the session's abort handle, so shutdown completes within a
/// bounded grace period even mid-read.
pub struct StreamReceiver {
    decoder: Arc<dyn StreamDecoder>,
    buffer: Arc<FrameRingBuffer>,
    config: ReceiverConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamReceiver {
    /// Create a receiver over an external decoder and a shared ring buffer.
    pub fn new(
        decoder: Arc<dyn StreamDecoder>,
        buffer: Arc<FrameRingBuffer>,
        config: ReceiverConfig,
    ) -> Self {
        Self {
            decoder,
            buffer,
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                state: Mutex::new(ConnectionState::Disconnected),
                abort: Mutex::new(None),
                sleep_lock: Mutex::new(()),
                wake: Condvar::new(),
                sequence: AtomicU64::new(0),
                malformed_frames: AtomicU64::new(0),
                epoch: Instant::now(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Frames rejected for a byte length not matching their declared geometry
    pub fn malformed_frames(&self) -> u64 {
        self.shared.malformed_frames.load(Ordering::Relaxed)
    }

    /// Start the decode worker against `url`.
    ///
    /// Restarts cleanly if a worker is already running, and is the explicit
    /// reconnect request that leaves a terminal `Failed` state.
    pub fn connect(&self, url: &str) {
        self.disconnect();

        info!(url, "starting stream receiver");
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);

        let shared = Arc::clone(&self.shared);
        let decoder = Arc::clone(&self.decoder);
        let buffer = Arc::clone(&self.buffer);
        let config = self.config.clone();
        let url = url.to_owned();

        let handle = thread::Builder::new()
            .name("stream-receiver".into())
            .spawn(move || run_worker(shared, decoder, buffer, config, url))
            .expect("failed to spawn receiver worker");

        *self.worker.lock().expect("receiver worker lock poisoned") = Some(handle);
    }

    /// Stop the worker, interrupting any blocked decode call.
    ///
    /// Safe to call from any state, repeatedly. Leaves the receiver
    /// `Disconnected`.
    pub fn disconnect(&self) {
        self.shared.running.store(false, Ordering::SeqCst);

        // Force a blocked next_frame to return
        if let Some(abort) = self
            .shared
            .abort
            .lock()
            .expect("receiver abort lock poisoned")
            .take()
        {
            abort.abort();
        }
        // Cut any backoff sleep short
        self.shared.wake.notify_all();

        if let Some(handle) = self
            .worker
            .lock()
            .expect("receiver worker lock poisoned")
            .take()
        {
            if handle.join().is_err() {
                warn!("receiver worker panicked during shutdown");
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for StreamReceiver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run_worker(
    shared: Arc<Shared>,
    decoder: Arc<dyn StreamDecoder>,
    buffer: Arc<FrameRingBuffer>,
    config: ReceiverConfig,
    url: String,
) {
    let mut attempts: u32 = 0;

    while shared.is_running() {
        shared.set_state(ConnectionState::Connecting);

        match decoder.open(&url) {
            Ok((mut session, abort)) => {
                *shared.abort.lock().expect("receiver abort lock poisoned") = Some(abort);
                shared.set_state(ConnectionState::Streaming);
                info!(url, "decode session open, streaming");

                while shared.is_running() {
                    match session.next_frame() {
                        Ok(Some(raw)) => match stamp_and_push(&shared, &buffer, raw) {
                            Ok(()) => attempts = 0,
                            Err(e) => {
                                shared.malformed_frames.fetch_add(1, Ordering::Relaxed);
                                warn!(error = %e, "dropping malformed frame");
                            }
                        },
                        Ok(None) => {
                            info!(url, "stream ended");
                            break;
                        }
                        Err(e) => {
                            warn!(url, error = %e, "decode error, closing session");
                            break;
                        }
                    }
                }

                shared
                    .abort
                    .lock()
                    .expect("receiver abort lock poisoned")
                    .take();
            }
            Err(e) => {
                warn!(url, error = %e, "failed to open decode session");
            }
        }

        if !shared.is_running() {
            break;
        }

        attempts += 1;
        if attempts >= config.max_attempts {
            warn!(url, attempts, "retry budget exhausted, giving up");
            shared.running.store(false, Ordering::SeqCst);
            shared.set_state(ConnectionState::Failed);
            return;
        }

        let delay = config.delay_for(attempts);
        debug!(url, attempt = attempts, ?delay, "reconnecting after delay");
        shared.set_state(ConnectionState::ReconnectWait);
        shared.interruptible_sleep(delay);
    }

    shared.set_state(ConnectionState::Disconnected);
}

fn stamp_and_push(
    shared: &Shared,
    buffer: &FrameRingBuffer,
    raw: DecodedFrame,
) -> Result<(), FrameError> {
    let sequence = shared.sequence.fetch_add(1, Ordering::Relaxed) + 1;
    let timestamp_ns = shared.epoch.elapsed().as_nanos() as u64;
    let frame = VideoFrame::from_data(
        raw.width,
        raw.height,
        raw.format,
        timestamp_ns,
        sequence,
        raw.data,
    )?;
    // Fire-and-forget: the bounded buffer absorbs backpressure by eviction
    buffer.push(frame);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReceiverConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_is_monotonic_and_bounded() {
        let config = ReceiverConfig {
            max_attempts: 100,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(7),
        };

        let mut previous = Duration::ZERO;
        for attempt in 1..=50 {
            let delay = config.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= config.max_delay);
            previous = delay;
        }
        assert_eq!(config.delay_for(1), Duration::from_secs(2));
        assert_eq!(config.delay_for(2), Duration::from_secs(4));
        assert_eq!(config.delay_for(4), Duration::from_secs(7));
    }
}
