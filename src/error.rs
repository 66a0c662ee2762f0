//! Error types for vcam-core

use std::io;
use thiserror::Error;

use crate::frame::PixelFormat;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Frame contract violations detected at construction or push time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Byte length does not match the canonical size for (width, height, format)
    #[error("frame data is {actual} bytes, expected {expected} for {width}x{height} {format}")]
    LengthMismatch {
        expected: usize,
        actual: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    },

    /// Width or height is zero
    #[error("invalid frame dimensions {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    /// Odd width or height for a 4:2:0 subsampled format
    #[error("odd dimensions {width}x{height} not allowed for {format}")]
    OddDimension {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}

/// Pixel conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Invalid source or target geometry
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// No conversion path between the two formats
    #[error("unsupported conversion: {from} -> {to}")]
    UnsupportedPair { from: PixelFormat, to: PixelFormat },
}

/// Errors surfaced by the external stream decoder
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Could not open a decode session against the URL
    #[error("failed to connect to stream: {0}")]
    Connect(String),

    /// Session produced an unrecoverable decode error
    #[error("decode error: {0}")]
    Decode(String),
}

impl DecodeError {
    /// Create a Connect error
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Create a Decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

/// Virtual output device errors
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Device node does not exist
    #[error("output device not found: {0}")]
    DeviceNotFound(String),

    /// Permission denied opening the device
    #[error("permission denied for {0}, try adding user to 'video' group")]
    PermissionDenied(String),

    /// Failed to open the device
    #[error("failed to open output device: {0}")]
    Open(String),

    /// Geometry negotiation failed
    #[error("device configuration error: {0}")]
    Configure(String),

    /// write_frame called while the device is closed
    #[error("device is not open")]
    NotOpen,

    /// write_frame called before configure_stream
    #[error("stream geometry not configured")]
    Unconfigured,

    /// Frame bytes do not match the configured geometry
    #[error("frame is {actual} bytes, device expects {expected}")]
    FrameSize { expected: usize, actual: usize },

    /// Write to the device failed
    #[error("device write error: {0}")]
    Write(String),

    /// Frame could not be converted for the device
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Top-level pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Frame contract error
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Conversion error
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Decoder error
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Output device error
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Pipeline is not running
    #[error("pipeline is not running")]
    NotRunning,

    /// Pipeline is already running
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// Internal channel error
    #[error("channel error: {0}")]
    Channel(String),
}
