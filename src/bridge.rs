//! Virtual Device Bridge
//!
//! Opens and holds the handle to a V4L2 loopback output device, negotiates a
//! fixed I420 output geometry, and writes converted frames to it. Also the
//! reverse path: locally captured packed frames go through `submit`, which
//! crops, converts and writes in one call.
//!
//! The bridge holds the only handle to its device path. Callers serialize
//! `configure_stream`/`write_frame`; the bridge does not lock across calls.
//!
//! ## Prerequisites
//!
//! The `v4l2loopback` kernel module must be loaded:
//!
//! ```bash
//! sudo modprobe v4l2loopback devices=1 video_nr=10 card_label="Virtual Camera"
//! ```

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use v4l::video::Output;
use v4l::{Device, FourCC};

use crate::convert;
use crate::error::BridgeError;
use crate::frame::{PixelFormat, VideoFrame};

/// The device-facing half of the bridge.
///
/// Real devices negotiate V4L2 formats and accept raw writes; tests inject
/// mocks that count negotiations instead.
pub trait OutputDevice: Send {
    /// Negotiate the output geometry with the device
    fn set_format(&mut self, width: u32, height: u32) -> Result<(), BridgeError>;
    /// Write one complete frame
    fn write(&mut self, data: &[u8]) -> Result<(), BridgeError>;
}

/// V4L2 loopback output device: ioctl-based format negotiation plus raw
/// `write()` frame delivery.
pub struct V4l2Output {
    path: PathBuf,
    file: File,
}

impl V4l2Output {
    /// Open the device node for writing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let path = path.into();
        if !path.exists() {
            return Err(BridgeError::DeviceNotFound(path.display().to_string()));
        }

        let file = OpenOptions::new().write(true).open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                BridgeError::PermissionDenied(path.display().to_string())
            } else {
                BridgeError::Open(e.to_string())
            }
        })?;

        Ok(Self { path, file })
    }
}

impl OutputDevice for V4l2Output {
    fn set_format(&mut self, width: u32, height: u32) -> Result<(), BridgeError> {
        let device = Device::with_path(&self.path)
            .map_err(|e| BridgeError::Configure(e.to_string()))?;

        // V4L2_PIX_FMT_YUV420
        let fourcc = FourCC::new(&PixelFormat::I420.fourcc());
        let fmt = v4l::Format::new(width, height, fourcc);

        // v4l2loopback often accepts writes without an explicit format set;
        // log and continue rather than failing the negotiation.
        if let Err(e) = device.set_format(&fmt) {
            warn!(path = %self.path.display(), error = %e, "could not set V4L2 format (may still work)");
        }

        debug!(
            path = %self.path.display(),
            width, height, "negotiated V4L2 output format"
        );
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        self.file
            .write_all(data)
            .map_err(|e| BridgeError::Write(e.to_string()))
    }
}

/// Bridge state machine: Closed -> Open(unconfigured) -> Open(configured).
pub struct VirtualDeviceBridge {
    device: Option<Box<dyn OutputDevice>>,
    geometry: Option<(u32, u32)>,
    frames_written: u64,
}

impl VirtualDeviceBridge {
    /// Create a closed bridge.
    pub fn new() -> Self {
        Self {
            device: None,
            geometry: None,
            frames_written: 0,
        }
    }

    /// Acquire the device handle at `path`, closing any previous handle first.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), BridgeError> {
        self.close();
        let output = V4l2Output::open(path.as_ref().to_path_buf())?;
        info!(path = %path.as_ref().display(), "virtual device opened");
        self.device = Some(Box::new(output));
        Ok(())
    }

    /// Acquire an already-constructed device, closing any previous handle
    /// first. This is the provisioning and test seam.
    pub fn open_with(&mut self, device: Box<dyn OutputDevice>) {
        self.close();
        self.device = Some(device);
    }

    /// Negotiate the output geometry.
    ///
    /// Idempotent: re-requesting the geometry already configured is a no-op
    /// success, so per-frame callers pay no renegotiation cost.
    pub fn configure_stream(&mut self, width: u32, height: u32) -> Result<(), BridgeError> {
        let device = self.device.as_mut().ok_or(BridgeError::NotOpen)?;

        if self.geometry == Some((width, height)) {
            return Ok(());
        }
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(BridgeError::Configure(format!(
                "invalid output geometry {}x{}",
                width, height
            )));
        }

        device.set_format(width, height)?;
        self.geometry = Some((width, height));
        Ok(())
    }

    /// Write one I420 frame matching the configured geometry.
    ///
    /// Valid only in the configured state.
    pub fn write_frame(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        let device = self.device.as_mut().ok_or(BridgeError::NotOpen)?;
        let (width, height) = self.geometry.ok_or(BridgeError::Unconfigured)?;

        let expected = PixelFormat::I420.buffer_size(width, height);
        if data.len() != expected {
            return Err(BridgeError::FrameSize {
                expected,
                actual: data.len(),
            });
        }

        device.write(data)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Convert a captured frame to I420 and write it at its own geometry.
    ///
    /// Packed frames with odd dimensions are cropped down to even ones first;
    /// frames already in I420 skip conversion entirely.
    pub fn submit(&mut self, frame: &VideoFrame) -> Result<(), BridgeError> {
        let cropped;
        let frame = match convert::crop_to_even(frame)? {
            Some(even) => {
                cropped = even;
                &cropped
            }
            None => frame,
        };

        let converted;
        let data: &[u8] = if frame.format == PixelFormat::I420 {
            &frame.data
        } else {
            converted = convert::convert(frame, PixelFormat::I420, frame.width, frame.height)?;
            &converted
        };

        self.configure_stream(frame.width, frame.height)?;
        self.write_frame(data)
    }

    /// Release the device handle. Safe from any state, repeatedly.
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            info!(frames = self.frames_written, "virtual device closed");
        }
        self.geometry = None;
    }

    /// Whether a device handle is held
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Configured output geometry, if negotiated
    pub fn geometry(&self) -> Option<(u32, u32)> {
        self.geometry
    }

    /// Frames written since the bridge was created
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Default for VirtualDeviceBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VirtualDeviceBridge {
    fn drop(&mut self) {
        self.close();
    }
}

/// Find V4L2 loopback output devices on the system.
pub fn find_loopback_devices() -> Vec<PathBuf> {
    let mut devices = Vec::new();

    if let Ok(entries) = std::fs::read_dir("/dev") {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_video = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("video"))
                .unwrap_or(false);
            if is_video && is_loopback_device(&path) {
                devices.push(path);
            }
        }
    }

    devices.sort();
    devices
}

/// Check whether a V4L2 device is an output-capable loopback device.
fn is_loopback_device(path: &Path) -> bool {
    if let Ok(device) = Device::with_path(path) {
        if let Ok(caps) = device.query_caps() {
            let has_output = caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_OUTPUT);
            return has_output && caps.driver.contains("v4l2 loopback");
        }
    }
    false
}

/// First available loopback device, or the conventional default path.
pub fn default_loopback_device() -> PathBuf {
    find_loopback_devices()
        .into_iter()
        .next()
        .unwrap_or_else(|| PathBuf::from("/dev/video10"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDevice {
        format_calls: u32,
        writes: u32,
    }

    impl CountingDevice {
        fn new() -> Self {
            Self {
                format_calls: 0,
                writes: 0,
            }
        }
    }

    impl OutputDevice for CountingDevice {
        fn set_format(&mut self, _width: u32, _height: u32) -> Result<(), BridgeError> {
            self.format_calls += 1;
            Ok(())
        }

        fn write(&mut self, _data: &[u8]) -> Result<(), BridgeError> {
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_closed_bridge_rejects_everything() {
        let mut bridge = VirtualDeviceBridge::new();
        assert!(!bridge.is_open());
        assert!(matches!(
            bridge.configure_stream(1280, 720),
            Err(BridgeError::NotOpen)
        ));
        assert!(matches!(
            bridge.write_frame(&[0u8; 16]),
            Err(BridgeError::NotOpen)
        ));
    }

    #[test]
    fn test_write_requires_configuration() {
        let mut bridge = VirtualDeviceBridge::new();
        bridge.open_with(Box::new(CountingDevice::new()));
        assert!(matches!(
            bridge.write_frame(&[0u8; 16]),
            Err(BridgeError::Unconfigured)
        ));
    }

    #[test]
    fn test_write_validates_frame_size() {
        let mut bridge = VirtualDeviceBridge::new();
        bridge.open_with(Box::new(CountingDevice::new()));
        bridge.configure_stream(4, 2).unwrap();
        assert!(matches!(
            bridge.write_frame(&[0u8; 5]),
            Err(BridgeError::FrameSize { expected: 12, .. })
        ));
        assert!(bridge.write_frame(&[0u8; 12]).is_ok());
        assert_eq!(bridge.frames_written(), 1);
    }

    #[test]
    fn test_configure_rejects_odd_geometry() {
        let mut bridge = VirtualDeviceBridge::new();
        bridge.open_with(Box::new(CountingDevice::new()));
        assert!(matches!(
            bridge.configure_stream(641, 480),
            Err(BridgeError::Configure(_))
        ));
        assert!(bridge.geometry().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut bridge = VirtualDeviceBridge::new();
        bridge.open_with(Box::new(CountingDevice::new()));
        bridge.close();
        bridge.close();
        assert!(!bridge.is_open());
    }

    #[test]
    fn test_open_missing_path_fails() {
        let mut bridge = VirtualDeviceBridge::new();
        let result = bridge.open("/dev/video999-does-not-exist");
        assert!(matches!(result, Err(BridgeError::DeviceNotFound(_))));
        assert!(!bridge.is_open());
    }
}
