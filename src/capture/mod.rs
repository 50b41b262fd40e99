mod region;
mod screen;

pub use region::Rectangle;
pub use screen::ScreenSource;

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::frame::RawFrame;

/// Nanoseconds since the owning clock's epoch.
pub type Timestamp = u64;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// A finite source has no more frames. Ends the recording normally.
    #[error("end of frame stream")]
    EndOfStream,

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("out of memory allocating a {bytes} byte frame")]
    OutOfMemory { bytes: usize },

    #[error("no monitors found")]
    NoMonitors,

    #[error("monitor {0} not found")]
    MonitorNotFound(u32),

    #[error("capture backend error: {0}")]
    Backend(String),
}

impl From<xcap::XCapError> for CaptureError {
    fn from(err: xcap::XCapError) -> Self {
        CaptureError::Backend(err.to_string())
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Steady clock counting from its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.epoch.elapsed().as_nanos().min(u128::from(u64::MAX)) as Timestamp
    }
}

#[derive(Debug)]
pub struct CapturedFrame {
    pub frame: RawFrame,
    pub timestamp: Timestamp,
}

/// Producer of timestamped frames, driven from the recorder's capture thread.
pub trait FrameSource: Send + 'static {
    /// Blocks until the next frame is available.
    fn grab(&mut self) -> Result<CapturedFrame, CaptureError>;

    /// The clock `grab` timestamps against. Used to time `stop`.
    fn clock(&self) -> Arc<dyn Clock>;
}

#[derive(Debug, Clone)]
pub struct MonitorInfo {
    pub id: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

pub fn list_monitors() -> Result<Vec<MonitorInfo>, CaptureError> {
    let screens = xcap::Monitor::all()?;
    let monitors: Vec<MonitorInfo> = screens
        .into_iter()
        .map(|s| MonitorInfo {
            id: s.id(),
            name: s.name().to_string(),
            x: s.x(),
            y: s.y(),
            width: s.width(),
            height: s.height(),
            is_primary: s.is_primary(),
        })
        .collect();
    Ok(monitors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = clock.now();
        assert!(b > a);
        assert!(b - a >= 2_000_000);
    }

    #[test]
    fn test_end_of_stream_display() {
        assert_eq!(CaptureError::EndOfStream.to_string(), "end of frame stream");
    }
}
