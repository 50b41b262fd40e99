use std::sync::Arc;

use xcap::Monitor;

use super::region::crop;
use super::{CaptureError, CapturedFrame, Clock, FrameSource, MonitorInfo, MonotonicClock, Rectangle};
use crate::frame::RawFrame;

const MAX_CAPTURE_DIMENSION: u32 = 16384;

pub struct ScreenSource {
    monitor_id: Option<u32>,
    region: Option<Rectangle>,
    clock: Arc<MonotonicClock>,
}

impl ScreenSource {
    pub fn new() -> Self {
        Self {
            monitor_id: None,
            region: None,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn with_monitor(monitor_id: u32) -> Result<Self, CaptureError> {
        let source = Self {
            monitor_id: Some(monitor_id),
            ..Self::new()
        };
        source.find_monitor()?;
        Ok(source)
    }

    pub fn with_region(mut self, region: Rectangle) -> Self {
        self.region = Some(region);
        self
    }

    fn find_monitor(&self) -> Result<Monitor, CaptureError> {
        let monitors = Monitor::all()?;

        match self.monitor_id {
            Some(id) => monitors
                .into_iter()
                .find(|m| m.id() == id)
                .ok_or(CaptureError::MonitorNotFound(id)),
            None => {
                let mut monitors = monitors.into_iter();
                let first = monitors.next().ok_or(CaptureError::NoMonitors)?;
                if first.is_primary() {
                    return Ok(first);
                }
                Ok(monitors.find(|m| m.is_primary()).unwrap_or(first))
            }
        }
    }

    pub fn monitor_info(&self) -> Result<MonitorInfo, CaptureError> {
        let monitor = self.find_monitor()?;
        Ok(MonitorInfo {
            id: monitor.id(),
            name: monitor.name().to_string(),
            x: monitor.x(),
            y: monitor.y(),
            width: monitor.width(),
            height: monitor.height(),
            is_primary: monitor.is_primary(),
        })
    }
}

impl Default for ScreenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScreenSource {
    fn grab(&mut self) -> Result<CapturedFrame, CaptureError> {
        let monitor = self.find_monitor()?;
        let image = monitor.capture_image()?;
        let timestamp = self.clock.now();

        if image.width() > MAX_CAPTURE_DIMENSION || image.height() > MAX_CAPTURE_DIMENSION {
            return Err(CaptureError::InvalidFrame(format!(
                "{}x{} capture exceeds the {} pixel limit",
                image.width(),
                image.height(),
                MAX_CAPTURE_DIMENSION
            )));
        }

        let image = match self.region {
            Some(region) => crop(image, region)?,
            None => image,
        };

        Ok(CapturedFrame {
            frame: RawFrame::from_rgba_image(image),
            timestamp,
        })
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}
