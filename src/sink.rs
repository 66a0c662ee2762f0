//! Frame Sink Adapter
//!
//! Per-consumer facade over the ring buffer. Each intercepted capture event
//! calls `deliver` with the exact format, geometry and buffer(s) the consumer
//! owns; the adapter pulls the latest frame, converts it only when necessary,
//! and writes into the caller's memory without ever retaining it.
//!
//! Delivery with no frame available is an ordinary "nothing to deliver"
//! result, not an error.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::convert;
use crate::frame::PixelFormat;
use crate::ring_buffer::FrameRingBuffer;

/// One consumer-owned destination plane.
///
/// Intercepted camera buffers commonly arrive as one buffer per plane, some of
/// which may be write-protected; a non-writable plane is skipped without
/// failing the rest of the delivery.
pub struct PlaneBuffer<'a> {
    /// Destination bytes for this plane
    pub data: &'a mut [u8],
    /// Whether the consumer allows writes to this plane
    pub writable: bool,
}

impl<'a> PlaneBuffer<'a> {
    /// A writable destination plane
    pub fn writable(data: &'a mut [u8]) -> Self {
        Self {
            data,
            writable: true,
        }
    }

    /// A write-protected destination plane
    pub fn read_only(data: &'a mut [u8]) -> Self {
        Self {
            data,
            writable: false,
        }
    }
}

/// Cheap, clone-able delivery handle over the shared ring buffer.
#[derive(Clone)]
pub struct FrameSinkAdapter {
    buffer: Arc<FrameRingBuffer>,
}

impl FrameSinkAdapter {
    /// Create an adapter over a shared ring buffer.
    pub fn new(buffer: Arc<FrameRingBuffer>) -> Self {
        Self { buffer }
    }

    /// Deliver the latest frame into a single consumer-owned buffer.
    ///
    /// Writes at most `min(produced, dest.len())` bytes. Returns `false` when
    /// no frame is available, when conversion fails, or when the destination
    /// is smaller than the produced frame (the clamped prefix is written, but
    /// truncation is never reported as success).
    pub fn deliver(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
        dest: &mut [u8],
    ) -> bool {
        let produced = match self.produce(format, width, height) {
            Some(bytes) => bytes,
            None => return false,
        };

        let len = produced.len().min(dest.len());
        dest[..len].copy_from_slice(&produced[..len]);

        if dest.len() < produced.len() {
            debug!(
                produced = produced.len(),
                capacity = dest.len(),
                "destination buffer smaller than frame, delivery truncated"
            );
            return false;
        }
        true
    }

    /// Deliver the latest frame into split-plane destinations, one buffer per
    /// plane in the target format's layout order.
    ///
    /// Each plane is clamped to its own destination independently; a
    /// non-writable plane is skipped. Fails on plane-count mismatch or when
    /// any writable plane is smaller than its produced plane.
    pub fn deliver_planes(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
        planes: &mut [PlaneBuffer<'_>],
    ) -> bool {
        if planes.len() != format.plane_count() {
            debug!(
                expected = format.plane_count(),
                got = planes.len(),
                "plane count mismatch"
            );
            return false;
        }

        let produced = match self.produce(format, width, height) {
            Some(bytes) => bytes,
            None => return false,
        };

        let mut complete = true;
        let mut offset = 0usize;
        for (plane, size) in planes.iter_mut().zip(format.plane_sizes(width, height)) {
            let src = &produced[offset..offset + size];
            offset += size;

            if !plane.writable {
                trace!(size, "skipping write-protected plane");
                continue;
            }
            let len = src.len().min(plane.data.len());
            plane.data[..len].copy_from_slice(&src[..len]);
            if plane.data.len() < src.len() {
                complete = false;
            }
        }
        complete
    }

    fn produce(&self, format: PixelFormat, width: u32, height: u32) -> Option<Vec<u8>> {
        let frame = self.buffer.latest()?;

        // Skip conversion when the stored frame already matches
        if frame.format == format && frame.width == width && frame.height == height {
            return Some(frame.data.clone());
        }

        match convert::convert(&frame, format, width, height) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(error = %e, "frame conversion for delivery failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::VideoFrame;

    fn ring_with_frame(width: u32, height: u32) -> Arc<FrameRingBuffer> {
        let ring = Arc::new(FrameRingBuffer::new(4));
        let size = PixelFormat::I420.buffer_size(width, height);
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        ring.push(VideoFrame::from_data(width, height, PixelFormat::I420, 0, 1, data).unwrap());
        ring
    }

    #[test]
    fn test_deliver_empty_buffer_fails_without_writing() {
        let sink = FrameSinkAdapter::new(Arc::new(FrameRingBuffer::new(4)));
        let mut dest = vec![0xaa; 6];
        assert!(!sink.deliver(PixelFormat::I420, 2, 2, &mut dest));
        assert!(dest.iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn test_deliver_matching_format_copies_verbatim() {
        let ring = ring_with_frame(8, 4);
        let sink = FrameSinkAdapter::new(Arc::clone(&ring));
        let mut dest = vec![0u8; PixelFormat::I420.buffer_size(8, 4)];
        assert!(sink.deliver(PixelFormat::I420, 8, 4, &mut dest));
        assert_eq!(dest, ring.latest().unwrap().data);
    }

    #[test]
    fn test_deliver_short_destination_reports_failure() {
        let ring = ring_with_frame(8, 4);
        let sink = FrameSinkAdapter::new(ring);
        let required = PixelFormat::I420.buffer_size(8, 4);
        let mut dest = vec![0u8; required - 10];
        assert!(!sink.deliver(PixelFormat::I420, 8, 4, &mut dest));
    }

    #[test]
    fn test_deliver_planes_skips_read_only() {
        let ring = ring_with_frame(4, 2);
        let sink = FrameSinkAdapter::new(Arc::clone(&ring));
        let frame = ring.latest().unwrap();

        let mut y = vec![0u8; 8];
        let mut u = vec![0xee; 2];
        let mut v = vec![0u8; 2];
        let mut planes = [
            PlaneBuffer::writable(&mut y),
            PlaneBuffer::read_only(&mut u),
            PlaneBuffer::writable(&mut v),
        ];
        assert!(sink.deliver_planes(PixelFormat::I420, 4, 2, &mut planes));

        assert_eq!(&y[..], frame.y_plane().unwrap());
        // Protected plane untouched
        assert_eq!(u, vec![0xee; 2]);
        assert_eq!(&v[..], frame.chroma_plane_2().unwrap());
    }

    #[test]
    fn test_deliver_planes_rejects_wrong_plane_count() {
        let ring = ring_with_frame(4, 2);
        let sink = FrameSinkAdapter::new(ring);
        let mut y = vec![0u8; 8];
        let mut planes = [PlaneBuffer::writable(&mut y)];
        assert!(!sink.deliver_planes(PixelFormat::I420, 4, 2, &mut planes));
    }
}
