use image::RgbaImage;

use crate::capture::CaptureError;

pub const BYTES_PER_PIXEL: usize = 4;

/// A 32-bit BGRA bitmap, rows top-down, pixels left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RawFrame {
    /// Allocate a zeroed frame. Allocation failure is reported, not retried.
    pub fn new(width: u32, height: u32) -> Result<Self, CaptureError> {
        let len = buffer_len(width, height)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| CaptureError::OutOfMemory { bytes: len })?;
        data.resize(len, 0);
        Ok(Self { width, height, data })
    }

    pub fn from_bgra(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = buffer_len(width, height)?;
        if data.len() != expected {
            return Err(CaptureError::InvalidFrame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Takes over the image buffer, swapping R and B in place.
    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let mut data = image.into_raw();
        swap_red_blue(&mut data);
        Self { width, height, data }
    }

    /// Hands the buffer to an `RgbaImage`, swapping B and R in place.
    pub fn into_rgba_image(self) -> RgbaImage {
        let Self { width, height, mut data } = self;
        swap_red_blue(&mut data);
        // Length is an invariant of RawFrame, so from_raw cannot fail here.
        RgbaImage::from_raw(width, height, data).unwrap_or_else(|| RgbaImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
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

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Pixels as `[b, g, r, a]`.
    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(BYTES_PER_PIXEL)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgra: [u8; 4]) {
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&bgra);
    }

    pub fn fill(&mut self, bgra: [u8; 4]) {
        for pixel in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&bgra);
        }
    }
}

fn buffer_len(width: u32, height: u32) -> Result<usize, CaptureError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| CaptureError::InvalidFrame(format!("{}x{} frame is too large", width, height)))
}

fn swap_red_blue(data: &mut [u8]) {
    for pixel in data.chunks_exact_mut(BYTES_PER_PIXEL) {
        pixel.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let frame = RawFrame::new(3, 2).unwrap();
        assert_eq!(frame.as_bytes().len(), 24);
        assert!(frame.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_from_bgra_rejects_wrong_length() {
        let result = RawFrame::from_bgra(2, 2, vec![0; 15]);
        assert!(matches!(result, Err(CaptureError::InvalidFrame(_))));
    }

    #[test]
    fn test_rgba_conversion_swaps_channels() {
        let mut frame = RawFrame::new(1, 1).unwrap();
        frame.set_pixel(0, 0, [10, 20, 30, 255]);
        let image = frame.into_rgba_image();
        assert_eq!(image.get_pixel(0, 0).0, [30, 20, 10, 255]);

        let back = RawFrame::from_rgba_image(image);
        assert_eq!(back.as_bytes(), &[10, 20, 30, 255]);
    }

    #[test]
    fn test_row_slices() {
        let mut frame = RawFrame::new(2, 2).unwrap();
        frame.set_pixel(1, 1, [1, 2, 3, 4]);
        assert_eq!(frame.row(1), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }
}
