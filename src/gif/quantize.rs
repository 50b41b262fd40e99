use crate::frame::RawFrame;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaletteColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl PaletteColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Output of a [`Quantizer`].
///
/// `palette` holds exactly `2^bits_per_pixel` entries and entry 0 is the
/// transparent color. `indices` has one entry per pixel, in frame order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantized {
    pub bits_per_pixel: u8,
    pub palette: Vec<PaletteColor>,
    pub indices: Vec<u8>,
}

impl Quantized {
    pub fn check(&self, pixel_count: usize) -> Result<(), String> {
        if !(1..=8).contains(&self.bits_per_pixel) {
            return Err(format!("bits per pixel {} out of range", self.bits_per_pixel));
        }
        let colors = 1usize << self.bits_per_pixel;
        if self.palette.len() != colors {
            return Err(format!(
                "palette has {} entries, expected {}",
                self.palette.len(),
                colors
            ));
        }
        if self.indices.len() != pixel_count {
            return Err(format!(
                "{} indices for {} pixels",
                self.indices.len(),
                pixel_count
            ));
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| usize::from(i) >= colors) {
            return Err(format!("index {} outside the palette", bad));
        }
        Ok(())
    }
}

pub trait Quantizer {
    fn quantize(&self, frame: &RawFrame) -> Quantized;
}

impl<Q: Quantizer + ?Sized> Quantizer for &Q {
    fn quantize(&self, frame: &RawFrame) -> Quantized {
        (**self).quantize(frame)
    }
}

const CUBE_LEVELS: u32 = 6;
const CUBE_STEP: u8 = 51;

/// Fixed 6x6x6 color cube. Fast and context free, no dithering.
#[derive(Debug, Clone, Copy, Default)]
pub struct CubeQuantizer;

impl CubeQuantizer {
    pub fn palette() -> Vec<PaletteColor> {
        let mut palette = Vec::with_capacity(256);
        palette.push(PaletteColor::default());
        for r in 0..CUBE_LEVELS as u8 {
            for g in 0..CUBE_LEVELS as u8 {
                for b in 0..CUBE_LEVELS as u8 {
                    palette.push(PaletteColor::new(r * CUBE_STEP, g * CUBE_STEP, b * CUBE_STEP));
                }
            }
        }
        palette.resize(256, PaletteColor::default());
        palette
    }

    #[inline]
    pub fn index_of(b: u8, g: u8, r: u8) -> u8 {
        let level = |c: u8| (5 * u32::from(c) + 130) >> 8;
        (level(r) * 36 + level(g) * 6 + level(b) + 1) as u8
    }
}

impl Quantizer for CubeQuantizer {
    fn quantize(&self, frame: &RawFrame) -> Quantized {
        let indices = frame
            .pixels()
            .map(|px| Self::index_of(px[0], px[1], px[2]))
            .collect();
        Quantized {
            bits_per_pixel: 8,
            palette: Self::palette(),
            indices,
        }
    }
}
