use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::detection::domain::detection_snapshot::DetectionSnapshot;
use crate::matching::match_engine::Resolution;

/// Per-pass face counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub faces_detected: usize,
    pub faces_blurred: usize,
}

impl Stats {
    pub fn from_resolution(snapshot: &DetectionSnapshot, resolution: &Resolution) -> Self {
        Self {
            faces_detected: snapshot.len(),
            faces_blurred: resolution.matched_count(),
        }
    }
}

/// Rate of events over a trailing one-second window.
pub struct FrameRateMeter {
    window: Duration,
    ticks: VecDeque<Instant>,
}

impl FrameRateMeter {
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(1),
            ticks: VecDeque::new(),
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.ticks.push_back(now);
        self.evict(now);
    }

    /// Events per second observed in the window ending at `now`.
    pub fn rate(&mut self, now: Instant) -> f64 {
        self.evict(now);
        self.ticks.len() as f64 / self.window.as_secs_f64()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.ticks.front() {
            if now.duration_since(oldest) < self.window {
                break;
            }
            self.ticks.pop_front();
        }
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new()
    }
}
