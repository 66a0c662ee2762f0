//! Stream Decoder Seam
//!
//! The remote stream's wire protocol and codec internals live outside this
//! crate. These traits are the contract an external decoder implements: open a
//! session against a URL, pull raw pixel frames from it with a blocking call,
//! and support a forced abort so shutdown never waits on a stalled read.

use std::sync::Arc;

use crate::error::DecodeError;
use crate::frame::PixelFormat;

/// A raw pixel frame as produced by the external decoder.
///
/// Carries no sequence number or timestamp; the receiver stamps both when it
/// admits the frame into the pipeline.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Frame data buffer
    pub data: Vec<u8>,
}

/// Handle that interrupts a session blocked inside `next_frame`.
///
/// Must be callable from any thread while the owning session is in use;
/// after `abort()` the pending or next `next_frame` call returns promptly
/// (either `Ok(None)` or an error).
pub trait SessionAbort: Send + Sync {
    fn abort(&self);
}

/// An open decode session against one stream URL.
pub trait DecodeSession: Send {
    /// Block until the next frame is available.
    ///
    /// `Ok(None)` signals a clean end of stream. Errors are transient from the
    /// pipeline's point of view; the receiver closes the session and retries
    /// per its backoff policy.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError>;
}

/// Factory for decode sessions.
pub trait StreamDecoder: Send + Sync {
    /// Open a decode session against `url`.
    ///
    /// Returns the session together with its abort handle. The session is
    /// owned exclusively by the receiver's worker; the abort handle may be
    /// held and invoked from other threads.
    fn open(
        &self,
        url: &str,
    ) -> Result<(Box<dyn DecodeSession>, Arc<dyn SessionAbort>), DecodeError>;
}
