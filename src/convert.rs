//! Pixel Format Conversion
//!
//! Pure functions converting frame bytes between pixel layouts and spatial
//! resolutions. No shared state; safe to call concurrently on independent
//! inputs.
//!
//! Conversion runs in two decoupled stages: a nearest-neighbor resample when
//! the geometry differs (luma at full resolution, chroma at half resolution in
//! each axis), then a re-layout when the format differs. The luma plane is
//! copied byte-for-byte across every supported layout.
//!
//! RGB <-> YUV uses the BT.601 integer transform, with chroma sampled at even
//! (row, column) pixel positions, one U and one V per 2x2 luma block.
//!
//! NV21 convention: the interleaved chroma plane carries V at the even offset
//! and U at the odd offset of each pair. NV12 is the opposite.

use crate::error::{ConvertError, FrameError};
use crate::frame::{PixelFormat, VideoFrame};

/// Full-resolution luma plus two half-resolution chroma planes.
///
/// The normalized intermediate every YUV layout decomposes into.
struct Planes {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

/// Convert a frame to the target format and geometry, returning raw bytes.
///
/// The output length is always `target_format.buffer_size(target_width,
/// target_height)`. Zero or odd target dimensions for a 4:2:0 layout are an
/// input error, never silently rounded.
pub fn convert(
    frame: &VideoFrame,
    target_format: PixelFormat,
    target_width: u32,
    target_height: u32,
) -> Result<Vec<u8>, ConvertError> {
    check_target_geometry(target_width, target_height, target_format)?;

    if frame.format == target_format
        && frame.width == target_width
        && frame.height == target_height
    {
        return Ok(frame.data.clone());
    }

    if frame.format.is_packed_rgb() {
        // Resample in packed space first, then transform to YUV if needed.
        let packed = if frame.width == target_width && frame.height == target_height {
            frame.data.clone()
        } else {
            resample_packed(
                &frame.data,
                frame.width as usize,
                frame.height as usize,
                target_width as usize,
                target_height as usize,
            )
        };

        if target_format.is_packed_rgb() {
            return Ok(swizzle_packed(packed, frame.format, target_format));
        }

        // Packed sources may carry odd dimensions; a 4:2:0 target needs even
        // ones, which check_target_geometry already enforced.
        let planes = rgb_to_yuv_planes(
            &packed,
            target_width as usize,
            target_height as usize,
            frame.format,
        );
        return Ok(assemble_yuv(&planes, target_format, target_width, target_height));
    }

    // YUV source: normalize to planes, resample, re-layout.
    let mut planes = split_yuv(frame);

    if frame.width != target_width || frame.height != target_height {
        planes = resample_planes(
            &planes,
            frame.width as usize,
            frame.height as usize,
            target_width as usize,
            target_height as usize,
        );
    }

    if target_format.is_packed_rgb() {
        return Ok(yuv_planes_to_rgb(
            &planes,
            target_width as usize,
            target_height as usize,
            target_format,
        ));
    }

    Ok(assemble_yuv(&planes, target_format, target_width, target_height))
}

/// Convert a frame, keeping its sequence number and timestamp.
pub fn convert_frame(
    frame: &VideoFrame,
    target_format: PixelFormat,
    target_width: u32,
    target_height: u32,
) -> Result<VideoFrame, ConvertError> {
    let data = convert(frame, target_format, target_width, target_height)?;
    Ok(VideoFrame {
        width: target_width,
        height: target_height,
        format: target_format,
        timestamp_ns: frame.timestamp_ns,
        sequence: frame.sequence,
        data,
    })
}

/// Crop a packed capture frame down to even dimensions.
///
/// Returns `Ok(None)` when both dimensions are already even, so the caller can
/// skip the copy entirely. Never upscales. Dimensions of 1 or less cannot be
/// cropped to a valid even size and are rejected.
pub fn crop_to_even(frame: &VideoFrame) -> Result<Option<VideoFrame>, ConvertError> {
    if !frame.format.is_packed_rgb() {
        // YUV420 frames are even-dimensioned by construction.
        return Ok(None);
    }
    let (width, height) = (frame.width, frame.height);
    if width <= 1 || height <= 1 {
        return Err(FrameError::ZeroDimension { width, height }.into());
    }
    let even_width = width - (width % 2);
    let even_height = height - (height % 2);
    if even_width == width && even_height == height {
        return Ok(None);
    }

    let src_stride = width as usize * 4;
    let dst_stride = even_width as usize * 4;
    let mut data = Vec::with_capacity(dst_stride * even_height as usize);
    for row in 0..even_height as usize {
        let start = row * src_stride;
        data.extend_from_slice(&frame.data[start..start + dst_stride]);
    }

    Ok(Some(VideoFrame {
        width: even_width,
        height: even_height,
        format: frame.format,
        timestamp_ns: frame.timestamp_ns,
        sequence: frame.sequence,
        data,
    }))
}

fn check_target_geometry(
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<(), ConvertError> {
    if width == 0 || height == 0 {
        return Err(FrameError::ZeroDimension { width, height }.into());
    }
    if format.is_yuv420() && (width % 2 != 0 || height % 2 != 0) {
        return Err(FrameError::OddDimension {
            width,
            height,
            format,
        }
        .into());
    }
    Ok(())
}

/// Source index for destination index `d`: floor(d * src / dst), clamped.
#[inline]
fn nearest_index(d: usize, src_dim: usize, dst_dim: usize) -> usize {
    (d * src_dim / dst_dim).min(src_dim - 1)
}

fn resample_plane(src: &[u8], sw: usize, sh: usize, dw: usize, dh: usize) -> Vec<u8> {
    let mut out = vec![0u8; dw * dh];
    for y in 0..dh {
        let sy = nearest_index(y, sh, dh);
        let src_row = &src[sy * sw..sy * sw + sw];
        let dst_row = &mut out[y * dw..y * dw + dw];
        for (x, dst) in dst_row.iter_mut().enumerate() {
            *dst = src_row[nearest_index(x, sw, dw)];
        }
    }
    out
}

fn resample_packed(src: &[u8], sw: usize, sh: usize, dw: usize, dh: usize) -> Vec<u8> {
    let mut out = vec![0u8; dw * dh * 4];
    for y in 0..dh {
        let sy = nearest_index(y, sh, dh);
        for x in 0..dw {
            let sx = nearest_index(x, sw, dw);
            let src_off = (sy * sw + sx) * 4;
            let dst_off = (y * dw + x) * 4;
            out[dst_off..dst_off + 4].copy_from_slice(&src[src_off..src_off + 4]);
        }
    }
    out
}

fn resample_planes(planes: &Planes, sw: usize, sh: usize, dw: usize, dh: usize) -> Planes {
    Planes {
        y: resample_plane(&planes.y, sw, sh, dw, dh),
        u: resample_plane(&planes.u, sw / 2, sh / 2, dw / 2, dh / 2),
        v: resample_plane(&planes.v, sw / 2, sh / 2, dw / 2, dh / 2),
    }
}

/// Decompose any 4:2:0 layout into separate Y, U, V planes.
fn split_yuv(frame: &VideoFrame) -> Planes {
    let y_size = frame.width as usize * frame.height as usize;
    let uv_size = y_size / 4;
    let y = frame.data[..y_size].to_vec();

    match frame.format {
        PixelFormat::I420 => Planes {
            y,
            u: frame.data[y_size..y_size + uv_size].to_vec(),
            v: frame.data[y_size + uv_size..].to_vec(),
        },
        PixelFormat::Yv12 => Planes {
            y,
            v: frame.data[y_size..y_size + uv_size].to_vec(),
            u: frame.data[y_size + uv_size..].to_vec(),
        },
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let chroma = &frame.data[y_size..];
            let mut u = vec![0u8; uv_size];
            let mut v = vec![0u8; uv_size];
            for i in 0..uv_size {
                let (a, b) = (chroma[i * 2], chroma[i * 2 + 1]);
                if frame.format == PixelFormat::Nv12 {
                    u[i] = a;
                    v[i] = b;
                } else {
                    v[i] = a;
                    u[i] = b;
                }
            }
            Planes { y, u, v }
        }
        // split_yuv is only called for YUV sources
        PixelFormat::Rgba8888 | PixelFormat::Argb8888 => unreachable!(),
    }
}

/// Assemble separate Y, U, V planes into the target 4:2:0 layout.
fn assemble_yuv(planes: &Planes, format: PixelFormat, width: u32, height: u32) -> Vec<u8> {
    let y_size = width as usize * height as usize;
    let uv_size = y_size / 4;
    let mut out = Vec::with_capacity(y_size + uv_size * 2);
    out.extend_from_slice(&planes.y);

    match format {
        PixelFormat::I420 => {
            out.extend_from_slice(&planes.u);
            out.extend_from_slice(&planes.v);
        }
        PixelFormat::Yv12 => {
            out.extend_from_slice(&planes.v);
            out.extend_from_slice(&planes.u);
        }
        PixelFormat::Nv12 => {
            for i in 0..uv_size {
                out.push(planes.u[i]);
                out.push(planes.v[i]);
            }
        }
        PixelFormat::Nv21 => {
            for i in 0..uv_size {
                out.push(planes.v[i]);
                out.push(planes.u[i]);
            }
        }
        PixelFormat::Rgba8888 | PixelFormat::Argb8888 => unreachable!(),
    }
    out
}

/// Byte offsets of R, G, B within a 4-byte packed pixel.
#[inline]
fn rgb_offsets(format: PixelFormat) -> (usize, usize, usize) {
    match format {
        PixelFormat::Rgba8888 => (0, 1, 2),
        PixelFormat::Argb8888 => (1, 2, 3),
        _ => unreachable!(),
    }
}

fn swizzle_packed(mut data: Vec<u8>, from: PixelFormat, to: PixelFormat) -> Vec<u8> {
    if from == to {
        return data;
    }
    // RGBA <-> ARGB: the alpha byte moves between ends of the pixel.
    for px in data.chunks_exact_mut(4) {
        if from == PixelFormat::Rgba8888 {
            // [R,G,B,A] -> [A,R,G,B]
            px.rotate_right(1);
        } else {
            // [A,R,G,B] -> [R,G,B,A]
            px.rotate_left(1);
        }
    }
    data
}

#[inline]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// BT.601 integer transform, packed RGB to planar YUV 4:2:0.
///
/// Chroma is sampled only at even (row, column) positions, one U and one V
/// per 2x2 luma block.
fn rgb_to_yuv_planes(packed: &[u8], width: usize, height: usize, format: PixelFormat) -> Planes {
    let (ro, go, bo) = rgb_offsets(format);
    let chroma_width = width / 2;

    let mut y_plane = vec![0u8; width * height];
    let mut u_plane = vec![0u8; width * height / 4];
    let mut v_plane = vec![0u8; width * height / 4];

    for row in 0..height {
        for col in 0..width {
            let px = (row * width + col) * 4;
            let r = packed[px + ro] as i32;
            let g = packed[px + go] as i32;
            let b = packed[px + bo] as i32;

            let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[row * width + col] = clamp_u8(y);

            if row % 2 == 0 && col % 2 == 0 {
                let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                let ci = (row / 2) * chroma_width + col / 2;
                u_plane[ci] = clamp_u8(u);
                v_plane[ci] = clamp_u8(v);
            }
        }
    }

    Planes {
        y: y_plane,
        u: u_plane,
        v: v_plane,
    }
}

/// Inverse BT.601 integer transform, planar YUV 4:2:0 to packed RGB.
///
/// Round-trips within +/-2 per channel of the forward transform.
fn yuv_planes_to_rgb(
    planes: &Planes,
    width: usize,
    height: usize,
    format: PixelFormat,
) -> Vec<u8> {
    let (ro, go, bo) = rgb_offsets(format);
    let alpha_offset = if format == PixelFormat::Argb8888 { 0 } else { 3 };
    let chroma_width = width / 2;

    let mut out = vec![0u8; width * height * 4];
    for row in 0..height {
        for col in 0..width {
            let ci = (row / 2) * chroma_width + col / 2;
            let c = planes.y[row * width + col] as i32 - 16;
            let d = planes.u[ci] as i32 - 128;
            let e = planes.v[ci] as i32 - 128;

            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;

            let px = (row * width + col) * 4;
            out[px + ro] = clamp_u8(r);
            out[px + go] = clamp_u8(g);
            out[px + bo] = clamp_u8(b);
            out[px + alpha_offset] = 0xff;
        }
    }
    out
}
