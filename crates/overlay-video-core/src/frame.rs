//! Decoded frame buffers handed from the decode side to the presentation side.

/// Pixel layout of a decoded frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA 32-bit, the layout the blit path uploads directly
    Rgba,
    /// BGRA 32-bit
    Bgra,
    /// RGB 24-bit, expanded to RGBA at upload time
    Rgb24,
}

impl PixelFormat {
    /// Bytes per pixel for this packed format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
            PixelFormat::Rgb24 => 3,
        }
    }

    /// Tightly packed size of a `width` x `height` image.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

/// A decoded frame owned by exactly one pipeline stage.
///
/// Move-only: there is no `Clone`, so a buffer sitting in the handoff queue
/// cannot also be held by the producer or the presenter. Releasing the
/// buffer is dropping it.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Bytes per row (may exceed `width * bytes_per_pixel` when padded)
    pub stride: usize,
    /// Monotonic sequence number assigned by the producer
    pub sequence: u64,
}

impl FrameBuffer {
    /// Wraps tightly packed pixel data.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self::with_stride(data, width, height, format, stride)
    }

    /// Wraps pixel data whose rows are `stride` bytes apart.
    pub fn with_stride(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: usize,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            stride,
            sequence: 0,
        }
    }

    /// Sets the producer sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Raw pixel bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds at least `stride * height` bytes and the
    /// stride covers a full row.
    pub fn is_well_formed(&self) -> bool {
        let row = self.width as usize * self.format.bytes_per_pixel();
        self.width > 0
            && self.height > 0
            && self.stride >= row
            && self.data.len() >= self.stride * (self.height as usize - 1) + row
    }

    /// Consumes the frame, returning its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
