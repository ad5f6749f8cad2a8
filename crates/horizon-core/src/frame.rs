/// An RGBA8 image read back from a render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Tightly packed RGBA8 pixel data, row-major, top row first.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameBuffer {
    /// Bytes per pixel; render targets are always RGBA8.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Create a frame buffer filled with zeros (transparent black).
    pub fn new(width: u32, height: u32) -> Self {
        let size = (width as usize) * (height as usize) * Self::BYTES_PER_PIXEL;
        Self {
            data: vec![0u8; size],
            width,
            height,
        }
    }

    /// Build from GPU rows that carry `padded_row` bytes each.
    ///
    /// Texture-to-buffer copies pad every row to the copy alignment; the
    /// padding is dropped here.
    pub fn from_padded_rows(width: u32, height: u32, padded_row: usize, bytes: &[u8]) -> Self {
        let row = width as usize * Self::BYTES_PER_PIXEL;
        let mut data = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * padded_row;
            data.extend_from_slice(&bytes[start..start + row]);
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Get the RGBA value at a pixel coordinate. Returns None if out of bounds.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * Self::BYTES_PER_PIXEL;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    /// Count pixels whose RGB channels are all zero.
    pub fn count_black(&self) -> usize {
        self.data
            .chunks_exact(Self::BYTES_PER_PIXEL)
            .filter(|px| px[0] == 0 && px[1] == 0 && px[2] == 0)
            .count()
    }
}
