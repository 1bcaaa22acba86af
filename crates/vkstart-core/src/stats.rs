//! Frame counting and once-per-second FPS reporting.

use std::time::{Duration, Instant};

/// Frames-per-second report emitted once per elapsed second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpsReport {
    /// Total frames presented so far.
    pub total_frames: u64,
    /// Frames presented during the last reporting interval.
    pub frames_per_second: u64,
}

/// Running frame statistics.
#[derive(Debug, Clone)]
pub struct FrameStats {
    frame_number: u64,
    frames_this_interval: u64,
    interval_start: Option<Instant>,
    interval: Duration,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            frame_number: 0,
            frames_this_interval: 0,
            interval_start: None,
            interval: Duration::from_secs(1),
        }
    }

    /// Total frames counted so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Count one presented frame at time `now`.
    ///
    /// Returns a report when at least one second has passed since the last one.
    pub fn tick(&mut self, now: Instant) -> Option<FpsReport> {
        let start = *self.interval_start.get_or_insert(now);

        self.frame_number += 1;
        self.frames_this_interval += 1;

        if now.duration_since(start) < self.interval {
            return None;
        }

        let report = FpsReport {
            total_frames: self.frame_number,
            frames_per_second: self.frames_this_interval,
        };
        self.interval_start = Some(now);
        self.frames_this_interval = 0;

        tracing::info!(
            "Total frames: {}, FPS: {}",
            report.total_frames,
            report.frames_per_second
        );

        Some(report)
    }
}
