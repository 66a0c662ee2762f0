//! Virtual Camera Pipeline
//!
//! Explicitly constructed, explicitly passed context object tying the pieces
//! together: the stream receiver feeding the ring buffer, sink adapters handed
//! to interception collaborators, and a processing task that forwards locally
//! captured frames to the virtual output device.
//!
//! One pipeline instance per stream; there is no process-wide singleton. The
//! configuration collaborator passes a typed snapshot at construction and may
//! push updated snapshots through `update_config`, which reacts to
//! enable/disable transitions by connecting or disconnecting the receiver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

use crate::bridge::{OutputDevice, VirtualDeviceBridge};
use crate::convert;
use crate::decoder::StreamDecoder;
use crate::error::{ConvertError, PipelineError};
use crate::frame::{PixelFormat, VideoFrame};
use crate::receiver::{ConnectionState, ReceiverConfig, StreamReceiver};
use crate::ring_buffer::{BufferStats, FrameRingBuffer};
use crate::sink::FrameSinkAdapter;

/// Pipeline configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Remote stream URL
    pub stream_url: String,
    /// Whether the remote stream should be connected
    pub enabled: bool,
    /// Virtual output device path
    pub device_path: PathBuf,
    /// Output video width
    pub width: u32,
    /// Output video height
    pub height: u32,
    /// Target frame rate (for statistics)
    pub fps: u32,
    /// Ring buffer capacity in frames
    pub buffer_capacity: usize,
    /// Submit queue depth (larger = more latency, smaller = more drops)
    pub queue_size: usize,
    /// Receiver reconnection policy
    pub receiver: ReceiverConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream_url: String::new(),
            enabled: false,
            device_path: PathBuf::from("/dev/video10"),
            width: 1280,
            height: 720,
            fps: 30,
            buffer_capacity: 30,
            queue_size: 5,
            receiver: ReceiverConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Config for 720p output
    pub fn hd_720p() -> Self {
        Self {
            width: 1280,
            height: 720,
            ..Default::default()
        }
    }

    /// Config for 1080p output
    pub fn fhd_1080p() -> Self {
        Self {
            width: 1920,
            height: 1080,
            ..Default::default()
        }
    }
}

/// Pipeline statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Receiver connection state
    pub connection: ConnectionState,
    /// Ring buffer usage
    pub buffer: BufferStats,
    /// Locally captured frames handed to `submit`
    pub frames_submitted: u64,
    /// Frames written to the output device
    pub frames_written: u64,
    /// Submitted frames dropped because the queue was full
    pub frames_dropped: u64,
    /// Conversion failures on the device path
    pub convert_errors: u64,
    /// Device write failures
    pub write_errors: u64,
    /// Decoded frames rejected for a bad byte length
    pub malformed_frames: u64,
}

#[derive(Default)]
struct StatsInner {
    frames_submitted: AtomicU64,
    frames_written: AtomicU64,
    frames_dropped: AtomicU64,
    convert_errors: AtomicU64,
    write_errors: AtomicU64,
}

/// The assembled frame pipeline with a start/stop lifecycle.
pub struct VirtualCameraPipeline {
    config: PipelineConfig,
    buffer: Arc<FrameRingBuffer>,
    receiver: StreamReceiver,
    running: Arc<AtomicBool>,
    frame_tx: Option<mpsc::Sender<VideoFrame>>,
    writer_task: Option<JoinHandle<()>>,
    stats: Arc<StatsInner>,
}

impl VirtualCameraPipeline {
    /// Assemble a pipeline from a config snapshot and an external decoder.
    pub fn new(config: PipelineConfig, decoder: Arc<dyn StreamDecoder>) -> Self {
        let buffer = Arc::new(FrameRingBuffer::new(config.buffer_capacity));
        let receiver =
            StreamReceiver::new(decoder, Arc::clone(&buffer), config.receiver.clone());
        Self {
            config,
            buffer,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            frame_tx: None,
            writer_task: None,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Whether the pipeline is started
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Delivery handle for an interception collaborator.
    pub fn sink(&self) -> FrameSinkAdapter {
        FrameSinkAdapter::new(Arc::clone(&self.buffer))
    }

    /// Shared ring buffer handle.
    pub fn buffer(&self) -> Arc<FrameRingBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Start the pipeline against the configured device path.
    ///
    /// Opens and configures the output device synchronously so resource
    /// errors surface here, then spawns the writer task and, when enabled,
    /// connects the receiver.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        let mut bridge = VirtualDeviceBridge::new();
        bridge.open(&self.config.device_path)?;
        self.start_with_bridge(bridge).await
    }

    /// Start the pipeline over an injected output device.
    pub async fn start_with_device(
        &mut self,
        device: Box<dyn OutputDevice>,
    ) -> Result<(), PipelineError> {
        let mut bridge = VirtualDeviceBridge::new();
        bridge.open_with(device);
        self.start_with_bridge(bridge).await
    }

    async fn start_with_bridge(
        &mut self,
        mut bridge: VirtualDeviceBridge,
    ) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }

        info!(
            width = self.config.width,
            height = self.config.height,
            fps = self.config.fps,
            device = %self.config.device_path.display(),
            "starting virtual camera pipeline"
        );

        // Negotiate the fixed output geometry up front
        bridge.configure_stream(self.config.width, self.config.height)?;

        let (tx, rx) = mpsc::channel::<VideoFrame>(self.config.queue_size);
        self.frame_tx = Some(tx);
        self.running.store(true, Ordering::Relaxed);

        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);
        let (width, height) = (self.config.width, self.config.height);
        self.writer_task = Some(tokio::spawn(async move {
            writer_task(bridge, rx, running, stats, width, height).await;
        }));

        if self.config.enabled {
            self.receiver.connect(&self.config.stream_url);
        }
        Ok(())
    }

    /// Stop the pipeline: disconnect the receiver, drain the writer task and
    /// close the device.
    pub async fn stop(&mut self) -> Result<(), PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::NotRunning);
        }

        info!("stopping virtual camera pipeline");
        self.receiver.disconnect();
        self.running.store(false, Ordering::Relaxed);
        self.frame_tx = None;

        if let Some(task) = self.writer_task.take() {
            if task.await.is_err() {
                error!("pipeline writer task panicked");
            }
        }

        let stats = self.stats();
        info!(
            submitted = stats.frames_submitted,
            written = stats.frames_written,
            dropped = stats.frames_dropped,
            "pipeline stopped"
        );
        Ok(())
    }

    /// Hand a locally captured frame to the output device path.
    ///
    /// Fire-and-forget: queues the frame for the writer task and never blocks
    /// the caller; a full queue drops the frame and counts it.
    pub fn submit(&self, frame: VideoFrame) -> Result<(), PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::NotRunning);
        }
        self.stats.frames_submitted.fetch_add(1, Ordering::Relaxed);

        let tx = self
            .frame_tx
            .as_ref()
            .ok_or_else(|| PipelineError::Channel("writer queue closed".into()))?;
        if tx.try_send(frame).is_err() {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("captured frame dropped, writer queue full");
        }
        Ok(())
    }

    /// Apply an updated configuration snapshot.
    ///
    /// Enable/disable and URL transitions take effect immediately while
    /// running; geometry and device changes apply on the next `start()`.
    pub fn update_config(&mut self, config: PipelineConfig) {
        if self.is_running() {
            let was_enabled = self.config.enabled;
            let url_changed = self.config.stream_url != config.stream_url;

            if was_enabled && !config.enabled {
                info!("stream disabled by configuration update");
                self.receiver.disconnect();
            } else if config.enabled && (!was_enabled || url_changed) {
                info!(url = %config.stream_url, "stream (re)enabled by configuration update");
                self.receiver.connect(&config.stream_url);
            }
        }
        self.config = config;
    }

    /// Current configuration snapshot
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Aggregated statistics snapshot
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            connection: self.receiver.state(),
            buffer: self.buffer.stats(),
            frames_submitted: self.stats.frames_submitted.load(Ordering::Relaxed),
            frames_written: self.stats.frames_written.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
            convert_errors: self.stats.convert_errors.load(Ordering::Relaxed),
            write_errors: self.stats.write_errors.load(Ordering::Relaxed),
            malformed_frames: self.receiver.malformed_frames(),
        }
    }
}

/// Writer task: owns the bridge, converts queued capture frames to the fixed
/// output geometry and writes them to the device.
async fn writer_task(
    mut bridge: VirtualDeviceBridge,
    mut rx: mpsc::Receiver<VideoFrame>,
    running: Arc<AtomicBool>,
    stats: Arc<StatsInner>,
    width: u32,
    height: u32,
) {
    // Short timeout so a stop request is noticed promptly even when idle
    let idle_tick = Duration::from_millis(50);

    while running.load(Ordering::Relaxed) {
        let frame = tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = tokio::time::sleep(idle_tick) => continue,
        };

        match prepare_for_device(&frame, width, height) {
            Ok(data) => {
                if let Err(e) = bridge.write_frame(&data) {
                    stats.write_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "failed to write frame to device");
                } else {
                    stats.frames_written.fetch_add(1, Ordering::Relaxed);
                    trace!(sequence = frame.sequence, "frame written to device");
                }
            }
            Err(e) => {
                stats.convert_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "failed to convert captured frame");
            }
        }
    }

    bridge.close();
}

fn prepare_for_device(
    frame: &VideoFrame,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ConvertError> {
    let cropped;
    let frame = match convert::crop_to_even(frame)? {
        Some(even) => {
            cropped = even;
            &cropped
        }
        None => frame,
    };
    convert::convert(frame, PixelFormat::I420, width, height)
}
