//! GIF89a encoding from first principles.

pub mod bit_stream;
pub mod delay;
pub mod encoder;
pub mod lzw;
pub mod quantize;

pub use bit_stream::{BitWriter, ByteSink};
pub use delay::{gif_delays, DelayScheduler};
pub use encoder::GifEncoder;
pub use lzw::{CodeSink, LzwEncoder};
pub use quantize::{CubeQuantizer, PaletteColor, Quantized, Quantizer};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid GIF dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("LZW sample depth must be between 1 and 8, got {0}")]
    InvalidBitDepth(u8),

    #[error("quantizer broke its contract: {0}")]
    InvalidQuantization(String),
}
