//! Conversion of capture timestamps into GIF frame delays.
//!
//! GIF delays are counted in hundredths of a second. A running "GIF clock"
//! tracks how much time the exported frames have covered so far, so rounding
//! errors never accumulate: a frame that would be shown for less than one
//! tick is dropped and its time is given to the next frame.

use crate::capture::Timestamp;

const NANOS_PER_TICK: i64 = 10_000_000;
const MIN_DISPLAY_NANOS: i64 = 10_000_000;
const ROUNDING_BIAS_NANOS: i64 = 5_000_000;

pub const MIN_DELAY: u16 = 2;
pub const MAX_DELAY: u16 = u16::MAX;

/// Incremental form of [`gif_delays`].
#[derive(Debug, Clone, Copy)]
pub struct DelayScheduler {
    gif_clock: i64,
}

impl DelayScheduler {
    /// Starts the GIF clock at the first frame's timestamp.
    pub fn new(first: Timestamp) -> Self {
        Self {
            gif_clock: first as i64,
        }
    }

    /// Delay for the current frame given the time it stops being shown.
    /// Zero means the frame should be left out.
    pub fn next(&mut self, finish: Timestamp) -> u16 {
        let desired = finish as i64 - self.gif_clock;
        if desired < MIN_DISPLAY_NANOS {
            return 0;
        }
        let ticks = (desired + ROUNDING_BIAS_NANOS) / NANOS_PER_TICK;
        let delay = ticks.clamp(i64::from(MIN_DELAY), i64::from(MAX_DELAY)) as u16;
        self.gif_clock += i64::from(delay) * NANOS_PER_TICK;
        delay
    }

    pub fn clock(&self) -> Timestamp {
        self.gif_clock.max(0) as Timestamp
    }
}

/// One delay per timestamp. `stop` ends the last frame.
pub fn gif_delays(timestamps: &[Timestamp], stop: Timestamp) -> Vec<u16> {
    let Some(&first) = timestamps.first() else {
        return Vec::new();
    };
    let mut scheduler = DelayScheduler::new(first);
    timestamps
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let finish = timestamps.get(i + 1).copied().unwrap_or(stop);
            scheduler.next(finish)
        })
        .collect()
}
