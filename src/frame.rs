//! Video Frame Types
//!
//! Defines the frame value type and pixel format tags used throughout the
//! pipeline. A frame's identity is its sequence number: two frames with equal
//! sequence numbers are the same frame even if their timestamps differ.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Pixel format for video frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 32-bit R,G,B,A byte order
    Rgba8888,
    /// Packed 32-bit A,R,G,B byte order
    Argb8888,
    /// YUV 4:2:0 planar, plane order Y,U,V
    I420,
    /// YUV 4:2:0 planar, plane order Y,V,U
    Yv12,
    /// YUV 4:2:0 semi-planar, chroma interleaved as U,V pairs
    Nv12,
    /// YUV 4:2:0 semi-planar, chroma interleaved as V,U pairs
    Nv21,
}

impl PixelFormat {
    /// Calculate the canonical buffer size for a frame
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Argb8888 => pixels * 4,
            // Y + U/4 + V/4, whether planar or interleaved
            PixelFormat::I420 | PixelFormat::Yv12 | PixelFormat::Nv12 | PixelFormat::Nv21 => {
                pixels * 3 / 2
            }
        }
    }

    /// Whether this is a 4:2:0 subsampled YUV layout
    pub fn is_yuv420(&self) -> bool {
        matches!(
            self,
            PixelFormat::I420 | PixelFormat::Yv12 | PixelFormat::Nv12 | PixelFormat::Nv21
        )
    }

    /// Whether this is a packed RGB layout
    pub fn is_packed_rgb(&self) -> bool {
        matches!(self, PixelFormat::Rgba8888 | PixelFormat::Argb8888)
    }

    /// Number of distinct planes in this layout
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Argb8888 => 1,
            PixelFormat::Nv12 | PixelFormat::Nv21 => 2,
            PixelFormat::I420 | PixelFormat::Yv12 => 3,
        }
    }

    /// Plane sizes in layout order for the given geometry
    pub fn plane_sizes(&self, width: u32, height: u32) -> Vec<usize> {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Argb8888 => vec![pixels * 4],
            PixelFormat::Nv12 | PixelFormat::Nv21 => vec![pixels, pixels / 2],
            PixelFormat::I420 | PixelFormat::Yv12 => vec![pixels, pixels / 4, pixels / 4],
        }
    }

    /// V4L2 fourcc code for this format.
    ///
    /// I420 maps to `YU12` (`V4L2_PIX_FMT_YUV420`).
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Rgba8888 => *b"AB24",
            PixelFormat::Argb8888 => *b"BA24",
            PixelFormat::I420 => *b"YU12",
            PixelFormat::Yv12 => *b"YV12",
            PixelFormat::Nv12 => *b"NV12",
            PixelFormat::Nv21 => *b"NV21",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgba8888 => write!(f, "RGBA8888"),
            PixelFormat::Argb8888 => write!(f, "ARGB8888"),
            PixelFormat::I420 => write!(f, "I420 (YUV 4:2:0 planar)"),
            PixelFormat::Yv12 => write!(f, "YV12 (YUV 4:2:0 planar)"),
            PixelFormat::Nv12 => write!(f, "NV12 (YUV 4:2:0 semi-planar)"),
            PixelFormat::Nv21 => write!(f, "NV21 (YUV 4:2:0 semi-planar)"),
        }
    }
}

/// A raw decoded video frame
///
/// Immutable value: pixel bytes, geometry, format, a monotonic capture
/// timestamp in nanoseconds, and a monotonically increasing sequence number
/// that serves as the sole identity key.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Capture timestamp, monotonic nanoseconds
    pub timestamp_ns: u64,
    /// Sequence number, the identity key
    pub sequence: u64,
    /// Frame data buffer, tightly packed
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Create a zero-filled frame with the canonical buffer size
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp_ns: u64,
        sequence: u64,
    ) -> Result<Self, FrameError> {
        Self::check_geometry(width, height, format)?;
        let size = format.buffer_size(width, height);
        Ok(Self {
            width,
            height,
            format,
            timestamp_ns,
            sequence,
            data: vec![0u8; size],
        })
    }

    /// Create a frame from existing data, validating the byte length
    pub fn from_data(
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp_ns: u64,
        sequence: u64,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        Self::check_geometry(width, height, format)?;
        let expected = format.buffer_size(width, height);
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: data.len(),
                width,
                height,
                format,
            });
        }
        Ok(Self {
            width,
            height,
            format,
            timestamp_ns,
            sequence,
            data,
        })
    }

    fn check_geometry(width: u32, height: u32, format: PixelFormat) -> Result<(), FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimension { width, height });
        }
        if format.is_yuv420() && (width % 2 != 0 || height % 2 != 0) {
            return Err(FrameError::OddDimension {
                width,
                height,
                format,
            });
        }
        Ok(())
    }

    /// Get the Y plane (for YUV formats)
    pub fn y_plane(&self) -> Option<&[u8]> {
        if !self.format.is_yuv420() {
            return None;
        }
        let y_size = self.width as usize * self.height as usize;
        Some(&self.data[..y_size])
    }

    /// Get the first chroma plane (U for I420, V for YV12)
    pub fn chroma_plane_1(&self) -> Option<&[u8]> {
        match self.format {
            PixelFormat::I420 | PixelFormat::Yv12 => {
                let y_size = self.width as usize * self.height as usize;
                let uv_size = y_size / 4;
                Some(&self.data[y_size..y_size + uv_size])
            }
            _ => None,
        }
    }

    /// Get the second chroma plane (V for I420, U for YV12)
    pub fn chroma_plane_2(&self) -> Option<&[u8]> {
        match self.format {
            PixelFormat::I420 | PixelFormat::Yv12 => {
                let y_size = self.width as usize * self.height as usize;
                let uv_size = y_size / 4;
                Some(&self.data[y_size + uv_size..])
            }
            _ => None,
        }
    }

    /// Get the interleaved chroma plane (for NV12/NV21)
    pub fn interleaved_chroma(&self) -> Option<&[u8]> {
        match self.format {
            PixelFormat::Nv12 | PixelFormat::Nv21 => {
                let y_size = self.width as usize * self.height as usize;
                Some(&self.data[y_size..])
            }
            _ => None,
        }
    }
}

impl PartialEq for VideoFrame {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for VideoFrame {}

impl Hash for VideoFrame {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_buffer_size() {
        // 1280x720 frame sizes
        assert_eq!(PixelFormat::I420.buffer_size(1280, 720), 1280 * 720 * 3 / 2);
        assert_eq!(PixelFormat::Yv12.buffer_size(1280, 720), 1280 * 720 * 3 / 2);
        assert_eq!(PixelFormat::Nv12.buffer_size(1280, 720), 1280 * 720 * 3 / 2);
        assert_eq!(PixelFormat::Nv21.buffer_size(1280, 720), 1280 * 720 * 3 / 2);
        assert_eq!(PixelFormat::Rgba8888.buffer_size(1280, 720), 1280 * 720 * 4);
    }

    #[test]
    fn test_video_frame_new() {
        let frame = VideoFrame::new(1280, 720, PixelFormat::I420, 0, 1).unwrap();
        assert_eq!(frame.width, 1280);
        assert_eq!(frame.height, 720);
        assert_eq!(frame.format, PixelFormat::I420);
        assert_eq!(frame.data.len(), 1280 * 720 * 3 / 2);
    }

    #[test]
    fn test_video_frame_planes() {
        let frame = VideoFrame::new(1280, 720, PixelFormat::I420, 0, 1).unwrap();

        let y = frame.y_plane().unwrap();
        let u = frame.chroma_plane_1().unwrap();
        let v = frame.chroma_plane_2().unwrap();

        assert_eq!(y.len(), 1280 * 720);
        assert_eq!(u.len(), 1280 * 720 / 4);
        assert_eq!(v.len(), 1280 * 720 / 4);
    }

    #[test]
    fn test_from_data_rejects_wrong_length() {
        let result = VideoFrame::from_data(640, 480, PixelFormat::I420, 0, 1, vec![0u8; 100]);
        assert!(matches!(result, Err(FrameError::LengthMismatch { .. })));
    }

    #[test]
    fn test_odd_dimensions_rejected_for_yuv420() {
        let result = VideoFrame::new(641, 480, PixelFormat::Nv21, 0, 1);
        assert!(matches!(result, Err(FrameError::OddDimension { .. })));

        // Packed formats allow odd dimensions; the caller crops before
        // converting to a 4:2:0 target.
        assert!(VideoFrame::new(641, 480, PixelFormat::Rgba8888, 0, 1).is_ok());
    }

    #[test]
    fn test_identity_is_sequence_number() {
        let a = VideoFrame::new(2, 2, PixelFormat::I420, 100, 7).unwrap();
        let mut b = VideoFrame::new(2, 2, PixelFormat::I420, 999, 7).unwrap();
        b.data[0] = 42;
        assert_eq!(a, b);

        let c = VideoFrame::new(2, 2, PixelFormat::I420, 100, 8).unwrap();
        assert_ne!(a, c);
    }
}
