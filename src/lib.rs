//! Screen recording into animated GIFs.
//!
//! [`gif`] holds a self-contained GIF89a encoder: bit packing, LZW
//! compression, palette quantization and delay scheduling. [`recording`]
//! drives a [`capture::FrameSource`] on its own thread, parks kept frames
//! on disk and exports them in capture order.

pub mod capture;
pub mod config;
pub mod frame;
pub mod gif;
pub mod recording;
