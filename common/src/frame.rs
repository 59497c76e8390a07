/// Bytes per RGBA pixel.
pub const CHANNELS: usize = 4;

/// One RGBA pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque gray pixel.
    pub const fn gray(v: u8) -> Self {
        Self::new(v, v, v, 255)
    }
}

/// A sampled frame: `width * height` RGBA pixels in row-major order.
///
/// Layout in memory is the interleaved `[r, g, b, a, r, g, b, a, ...]` form
/// image decoders and canvases hand out, so frames can be built from decoder
/// output without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Wrap interleaved RGBA bytes. The byte length must be `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::BufferLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame with every pixel set to `pixel`.
    pub fn filled(width: u32, height: u32, pixel: Pixel) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            data.extend_from_slice(&[pixel.r, pixel.g, pixel.b, pixel.a]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Build a frame from pixels in row-major order.
    pub fn from_pixels(width: u32, height: u32, pixels: &[Pixel]) -> Result<Self, FrameError> {
        let data = pixels.iter().flat_map(|p| [p.r, p.g, p.b, p.a]).collect();
        Self::from_rgba(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels (`width * height`).
    pub fn len(&self) -> usize {
        self.data.len() / CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pixel(&self, index: usize) -> Option<Pixel> {
        let offset = index.checked_mul(CHANNELS)?;
        let px = self.data.get(offset..offset + CHANNELS)?;
        Some(Pixel::new(px[0], px[1], px[2], px[3]))
    }

    pub fn pixel_at(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixel(y as usize * self.width as usize + x as usize)
    }

    pub fn set_pixel(&mut self, index: usize, pixel: Pixel) {
        let offset = index * CHANNELS;
        self.data[offset..offset + CHANNELS].copy_from_slice(&[pixel.r, pixel.g, pixel.b, pixel.a]);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data
            .chunks_exact(CHANNELS)
            .map(|px| Pixel::new(px[0], px[1], px[2], px[3]))
    }

    /// Errors unless the frame is exactly `width` x `height`.
    pub fn ensure_dimensions(&self, width: u32, height: u32) -> Result<(), FrameError> {
        if self.width != width || self.height != height {
            return Err(FrameError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is {width}x{height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },
    #[error("RGBA buffer has {got} bytes, expected {expected}")]
    BufferLength { expected: usize, got: usize },
}
