//! CPU-side preparation of frame rows for texture upload.

use std::borrow::Cow;

use overlay_video_core::{FrameBuffer, PixelFormat};

/// wgpu requires bytes_per_row to be aligned to this value.
pub const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

/// Aligns a value up to the nearest multiple of `alignment` (a power of two).
pub fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Texel layout a frame is uploaded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelLayout {
    Rgba8,
    Bgra8,
}

/// Rows ready for a texture copy.
#[derive(Debug)]
pub struct PreparedRows<'a> {
    pub layout: TexelLayout,
    pub bytes_per_row: u32,
    pub data: Cow<'a, [u8]>,
}

/// Packs a frame into 4-byte texels with aligned rows.
///
/// RGB24 is expanded to RGBA with opaque alpha. Missing trailing bytes in a
/// truncated frame are zero-filled (black for RGB24).
pub fn prepare_rows(frame: &FrameBuffer) -> PreparedRows<'_> {
    match frame.format {
        PixelFormat::Rgba => {
            let (bytes_per_row, data) = pad_rows(frame.data(), frame.stride, frame.height);
            PreparedRows {
                layout: TexelLayout::Rgba8,
                bytes_per_row,
                data,
            }
        }
        PixelFormat::Bgra => {
            let (bytes_per_row, data) = pad_rows(frame.data(), frame.stride, frame.height);
            PreparedRows {
                layout: TexelLayout::Bgra8,
                bytes_per_row,
                data,
            }
        }
        PixelFormat::Rgb24 => {
            let (bytes_per_row, data) = expand_rgb24(frame);
            PreparedRows {
                layout: TexelLayout::Rgba8,
                bytes_per_row,
                data: Cow::Owned(data),
            }
        }
    }
}

/// Pads each row of `data` to the copy alignment.
/// Borrows when the stride is already aligned.
pub fn pad_rows(data: &[u8], stride: usize, height: u32) -> (u32, Cow<'_, [u8]>) {
    let stride_u32 = stride as u32;
    let aligned = align_up(stride_u32, COPY_BYTES_PER_ROW_ALIGNMENT);
    let needed = stride * height as usize;

    if aligned == stride_u32 && data.len() >= needed {
        return (stride_u32, Cow::Borrowed(&data[..needed]));
    }

    let mut padded = Vec::with_capacity(aligned as usize * height as usize);
    for row in 0..height as usize {
        let start = (row * stride).min(data.len());
        let end = (start + stride).min(data.len());
        padded.extend_from_slice(&data[start..end]);
        padded.resize(padded.len() + stride - (end - start), 0);
        padded.resize(padded.len() + (aligned - stride_u32) as usize, 0);
    }
    (aligned, Cow::Owned(padded))
}

fn expand_rgb24(frame: &FrameBuffer) -> (u32, Vec<u8>) {
    let rgba_stride = frame.width * 4;
    let aligned = align_up(rgba_stride, COPY_BYTES_PER_ROW_ALIGNMENT);
    let padding = (aligned - rgba_stride) as usize;
    let src = frame.data();

    let mut out = Vec::with_capacity(aligned as usize * frame.height as usize);
    let mut truncated = false;
    for y in 0..frame.height as usize {
        for x in 0..frame.width as usize {
            let offset = y * frame.stride + x * 3;
            match src.get(offset..offset + 3) {
                Some(rgb) => out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]),
                None => {
                    out.extend_from_slice(&[0, 0, 0, 255]);
                    truncated = true;
                }
            }
        }
        out.resize(out.len() + padding, 0);
    }
    if truncated {
        tracing::warn!(
            "RGB24 frame truncated: {}x{} stride {} but {} bytes",
            frame.width,
            frame.height,
            frame.stride,
            src.len()
        );
    }
    (aligned, out)
}
