use std::sync::{Arc, Mutex, MutexGuard};

use crate::compositing::compositor::Composition;
use crate::compositing::stats::Stats;
use crate::shared::frame::Frame;

#[derive(Default)]
struct SurfaceState {
    pass: u64,
    frame: Option<Arc<Frame>>,
    stats: Stats,
    published: u64,
}

/// The composed picture every sink reads from.
///
/// Compositor passes run on a worker pool and may finish out of order, so
/// each publish carries the sequence number of the tick that started it and
/// a pass older than the one on screen is dropped.
#[derive(Default)]
pub struct DisplaySurface {
    state: Mutex<SurfaceState>,
}

impl DisplaySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if a newer pass is already shown.
    pub fn publish(&self, pass: u64, composition: Composition) -> bool {
        let mut state = self.lock();
        if state.frame.is_some() && pass <= state.pass {
            log::trace!("Dropping stale pass {pass} (showing {})", state.pass);
            return false;
        }
        state.pass = pass;
        state.frame = Some(Arc::new(composition.frame));
        state.stats = composition.stats;
        state.published += 1;
        true
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.lock().frame.clone()
    }

    pub fn stats(&self) -> Stats {
        self.lock().stats
    }

    /// Number of passes accepted so far.
    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Blanks the surface, e.g. when the stream stops.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.frame = None;
        state.stats = Stats::default();
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
