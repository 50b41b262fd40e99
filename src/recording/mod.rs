mod recorder;
mod store;

pub use recorder::Recorder;
pub use store::{FrameStore, PersistError, PngStore, TempFiles};

use std::path::PathBuf;

use thiserror::Error;

use crate::capture::CaptureError;
use crate::gif::EncodingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    /// Upper bound on kept frames per second.
    pub fps_limit: f64,
    /// Where captured frames wait for export.
    pub temp_dir: PathBuf,
    /// Concurrent frame writers.
    pub persist_threads: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            fps_limit: 50.0,
            temp_dir: std::env::temp_dir(),
            persist_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Frames kept by the capture throttle.
    pub captured: usize,
    /// Frames written to the GIF.
    pub written: usize,
    /// Frames too short to show, lost in persistence, or rejected by the encoder.
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("invalid recorder settings: {0}")]
    InvalidSettings(String),

    #[error("recording already stopped")]
    AlreadyStopped,

    #[error("recording was never started")]
    NotStarted,

    #[error("no frames captured")]
    NoFrames,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GIF encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
}
