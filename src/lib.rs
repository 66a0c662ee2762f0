//! vcam-core
//!
//! Frame acquisition, buffering, conversion, and delivery pipeline for a
//! virtual camera: substitutes camera-originated video with frames decoded
//! from a remote live stream, and forwards locally rendered frames into a
//! V4L2 loopback device so other applications consume them as a real camera.
//!
//! ## Architecture
//!
//! ```text
//! Remote stream -> StreamReceiver -> FrameRingBuffer -> FrameSinkAdapter(s)
//!                                                            |
//!                                                  consumer-owned buffers
//!
//! Local capture -> convert -> VirtualDeviceBridge -> /dev/videoN
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vcam_core::{PipelineConfig, VirtualCameraPipeline};
//!
//! # async fn example(decoder: Arc<dyn vcam_core::StreamDecoder>) -> vcam_core::Result<()> {
//! let config = PipelineConfig {
//!     stream_url: "rtmp://example/live".into(),
//!     enabled: true,
//!     ..PipelineConfig::hd_720p()
//! };
//!
//! let mut pipeline = VirtualCameraPipeline::new(config, decoder);
//! pipeline.start().await?;
//!
//! // Hand delivery handles to interception collaborators
//! let sink = pipeline.sink();
//!
//! pipeline.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The wire protocol and codec internals of the remote stream live behind the
//! [`StreamDecoder`] trait; camera API interception, privileged device setup
//! and configuration storage are external collaborators.

// Re-export commonly used types
pub use error::{BridgeError, ConvertError, DecodeError, FrameError, PipelineError, Result};
pub use frame::{PixelFormat, VideoFrame};

// Public modules
pub mod bridge;
pub mod convert;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod receiver;
pub mod ring_buffer;
pub mod sink;

pub use bridge::{OutputDevice, V4l2Output, VirtualDeviceBridge};
pub use decoder::{DecodeSession, DecodedFrame, SessionAbort, StreamDecoder};
pub use pipeline::{PipelineConfig, PipelineStats, VirtualCameraPipeline};
pub use receiver::{ConnectionState, ReceiverConfig, StreamReceiver};
pub use ring_buffer::{BufferStats, FrameRingBuffer};
pub use sink::{FrameSinkAdapter, PlaneBuffer};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
