use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::bit_stream::{BitWriter, ByteSink};
use super::delay::MIN_DELAY;
use super::lzw::LzwEncoder;
use super::quantize::{CubeQuantizer, Quantizer};
use super::EncodingError;
use crate::frame::RawFrame;

const SIGNATURE: &[u8] = b"GIF89a";
const EXTENSION_INTRODUCER: u8 = 0x21;
const GRAPHICS_CONTROL_LABEL: u8 = 0xF9;
const APPLICATION_LABEL: u8 = 0xFF;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;
const MAX_SUB_BLOCK: usize = 255;

// Global color table present, 8 bits of color resolution, table of 2 entries.
const SCREEN_FLAGS: u8 = 0xF0;
// Restore to background after display, transparent color index present.
const GRAPHICS_CONTROL_FLAGS: u8 = 0x05;
const LOCAL_TABLE_FLAG: u8 = 0x80;

/// Streams GIF data blocks: every 255 bytes become one length-prefixed
/// sub-block. [`finish`](Self::finish) writes the remainder and the
/// zero-length terminator.
struct SubBlockWriter<'a> {
    out: &'a mut Vec<u8>,
    block: [u8; MAX_SUB_BLOCK],
    len: usize,
}

impl<'a> SubBlockWriter<'a> {
    fn new(out: &'a mut Vec<u8>) -> Self {
        Self {
            out,
            block: [0; MAX_SUB_BLOCK],
            len: 0,
        }
    }

    fn emit_block(&mut self) {
        if self.len > 0 {
            self.out.push(self.len as u8);
            self.out.extend_from_slice(&self.block[..self.len]);
            self.len = 0;
        }
    }

    fn finish(mut self) {
        self.emit_block();
        self.out.push(0);
    }
}

impl ByteSink for SubBlockWriter<'_> {
    fn consume(&mut self, byte: u8) {
        self.block[self.len] = byte;
        self.len += 1;
        if self.len == MAX_SUB_BLOCK {
            self.emit_block();
        }
    }
}

/// Single threaded GIF89a writer.
///
/// The logical screen size is fixed at construction; every frame is drawn
/// over the full canvas with its own local color table.
pub struct GifEncoder<W: Write, Q: Quantizer = CubeQuantizer> {
    writer: W,
    width: u16,
    height: u16,
    quantizer: Q,
    frames: usize,
    finished: bool,
    // Reused between frames.
    block: Vec<u8>,
}

impl GifEncoder<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Self, EncodingError> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), width, height)
    }
}

impl<W: Write> GifEncoder<W> {
    pub fn new(writer: W, width: u32, height: u32) -> Result<Self, EncodingError> {
        Self::with_quantizer(writer, width, height, CubeQuantizer)
    }
}

impl<W: Write, Q: Quantizer> GifEncoder<W, Q> {
    /// Writes the file header right away.
    pub fn with_quantizer(writer: W, width: u32, height: u32, quantizer: Q) -> Result<Self, EncodingError> {
        let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(EncodingError::InvalidDimensions { width, height }),
        };

        let mut encoder = Self {
            writer,
            width: w,
            height: h,
            quantizer,
            frames: 0,
            finished: false,
            block: Vec::new(),
        };
        encoder.write_header()?;
        Ok(encoder)
    }

    fn write_header(&mut self) -> Result<(), EncodingError> {
        self.block.clear();
        let mut bits = BitWriter::new(&mut self.block);
        bits.write_bytes(SIGNATURE);

        // Logical screen descriptor with a dummy two-entry global table.
        bits.write_le(self.width).write_le(self.height);
        bits.write_le(SCREEN_FLAGS).write_le(0u8).write_le(0u8);
        bits.write_bytes(&[0; 6]);

        // Loop forever.
        bits.write_le(EXTENSION_INTRODUCER).write_le(APPLICATION_LABEL).write_le(11u8);
        bits.write_bytes(b"NETSCAPE2.0");
        bits.write_bytes(&[3, 1]).write_le(0u16).write_le(0u8);

        self.writer.write_all(&self.block)?;
        Ok(())
    }

    /// Appends one frame shown for `delay` hundredths of a second.
    ///
    /// Returns `Ok(false)` without writing anything if the encoder is
    /// finished or the frame size differs from the canvas.
    pub fn add_frame(&mut self, frame: &RawFrame, delay: u16) -> Result<bool, EncodingError> {
        if self.finished {
            tracing::debug!("dropping frame: encoder already finished");
            return Ok(false);
        }
        if frame.dimensions() != (u32::from(self.width), u32::from(self.height)) {
            tracing::debug!(
                "dropping {}x{} frame on a {}x{} canvas",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            );
            return Ok(false);
        }

        let quantized = self.quantizer.quantize(frame);
        quantized
            .check(frame.pixel_count())
            .map_err(EncodingError::InvalidQuantization)?;
        let bpp = quantized.bits_per_pixel;
        // GIF has no 1-bit LZW code size.
        let code_size = bpp.max(2);

        self.block.clear();
        let mut bits = BitWriter::new(&mut self.block);

        bits.write_le(EXTENSION_INTRODUCER).write_le(GRAPHICS_CONTROL_LABEL).write_le(4u8);
        bits.write_le(GRAPHICS_CONTROL_FLAGS)
            .write_le(delay.max(MIN_DELAY))
            .write_le(0u8)
            .write_le(0u8);

        bits.write_le(IMAGE_SEPARATOR);
        bits.write_le(0u16).write_le(0u16);
        bits.write_le(self.width).write_le(self.height);
        bits.write_le(LOCAL_TABLE_FLAG | (bpp - 1));

        for color in &quantized.palette {
            bits.write_le(color.r).write_le(color.g).write_le(color.b);
        }

        bits.write_le(code_size);

        let mut blocks = BitWriter::new(SubBlockWriter::new(&mut self.block));
        {
            let mut lzw = LzwEncoder::new(code_size, &mut blocks)?;
            lzw.extend(quantized.indices.iter().copied());
            lzw.finish();
        }
        blocks.flush();
        blocks.into_inner().finish();

        self.writer.write_all(&self.block)?;
        self.frames += 1;
        Ok(true)
    }

    /// Writes the trailer and flushes. Calling it again does nothing.
    pub fn finish(&mut self) -> Result<(), EncodingError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.write_all(&[TRAILER])?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (u32::from(self.width), u32::from(self.height))
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write, Q: Quantizer> Drop for GifEncoder<W, Q> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("failed to finish GIF: {}", e);
        }
    }
}
