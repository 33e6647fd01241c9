use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TrySendError};

use crate::compositing::compositor::Compositor;
use crate::compositing::stats::FrameRateMeter;
use crate::detection::domain::detection_snapshot::DetectionSnapshot;
use crate::matching::domain::registry::IdentityRegistry;
use crate::matching::match_engine::MatchEngine;
use crate::output::domain::surface::DisplaySurface;
use crate::shared::frame::Frame;
use crate::shared::latest_slot::SlotReader;
use crate::stream::domain::feed::FeedReader;

use super::session_logger::SessionLogger;

pub type SharedLogger = Arc<Mutex<Box<dyn SessionLogger>>>;

/// How long `stop` waits for workers stuck in a verifier call.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// State every compositor pass reads or updates.
pub struct RenderShared {
    pub engine: Arc<MatchEngine>,
    pub registry: Arc<dyn IdentityRegistry>,
    pub surface: Arc<DisplaySurface>,
    pub logger: SharedLogger,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Redact,
    /// No working detector: frames are shown as they arrive.
    Passthrough,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Published,
    /// A later pass reached the surface first.
    Superseded,
    /// Composition failed; nothing was shown for this pass.
    Dropped,
}

/// One compositor pass: resolve the current snapshot against the registry
/// and publish the redacted frame.
///
/// The registry is re-read on every pass so edits take effect on the next
/// tick.
pub fn render_pass(
    pass: u64,
    compositor: &Compositor,
    frame: &Frame,
    snapshot: &DetectionSnapshot,
    shared: &RenderShared,
    mode: RenderMode,
) -> PassOutcome {
    let composition = match mode {
        RenderMode::Passthrough => Compositor::compose_passthrough(frame),
        RenderMode::Redact => {
            let started = Instant::now();
            let entries = shared.registry.entries();
            let resolution = shared.engine.resolve(snapshot, &entries);
            let resolve_ms = started.elapsed().as_secs_f64() * 1000.0;

            let started = Instant::now();
            let composed = compositor.compose(frame, snapshot, &resolution);
            let compose_ms = started.elapsed().as_secs_f64() * 1000.0;

            let mut logger = lock(&shared.logger);
            logger.timing("resolve", resolve_ms);
            logger.timing("compose", compose_ms);
            match composed {
                Ok(composition) => {
                    logger.metric("faces_detected", composition.stats.faces_detected as f64);
                    logger.metric("faces_blurred", composition.stats.faces_blurred as f64);
                    logger.metric("verifier_calls", shared.engine.verifier_calls() as f64);
                    composition
                }
                Err(e) => {
                    log::warn!("Dropping pass {pass} on frame {}: {e}", frame.index());
                    return PassOutcome::Dropped;
                }
            }
        }
    };

    if shared.surface.publish(pass, composition) {
        lock(&shared.logger).pass_completed();
        PassOutcome::Published
    } else {
        PassOutcome::Superseded
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Display-refresh driver.
///
/// A ticker thread emits numbered passes at the refresh rate into a bounded
/// queue served by a pool of workers, one compositor each. When every worker
/// is busy (typically waiting on the verifier) the tick is dropped rather
/// than queued, so the display never falls behind real time. With two or
/// more workers, passes overlap and the engine's in-flight set keeps them
/// from repeating each other's verifier calls.
pub struct RenderLoop {
    shared: Arc<RenderShared>,
    compositors: Vec<Compositor>,
    feed: FeedReader,
    snapshots: SlotReader<DetectionSnapshot>,
    refresh_interval: Duration,
    mode: RenderMode,
}

impl RenderLoop {
    pub fn new(
        shared: Arc<RenderShared>,
        compositors: Vec<Compositor>,
        feed: FeedReader,
        snapshots: SlotReader<DetectionSnapshot>,
        refresh_interval: Duration,
        mode: RenderMode,
    ) -> Self {
        Self {
            shared,
            compositors,
            feed,
            snapshots,
            refresh_interval,
            mode,
        }
    }

    pub fn spawn(self) -> std::io::Result<RenderLoopHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let meter = Arc::new(Mutex::new(FrameRateMeter::new()));
        let skipped = Arc::new(AtomicU64::new(0));
        let worker_count = self.compositors.len().max(1);
        let (tx, rx) = crossbeam_channel::bounded::<u64>(worker_count);

        let mut workers = Vec::with_capacity(worker_count);
        for (i, compositor) in self.compositors.into_iter().enumerate() {
            let worker = Worker {
                compositor,
                feed: self.feed.clone(),
                snapshots: self.snapshots.clone(),
                shared: self.shared.clone(),
                meter: meter.clone(),
                mode: self.mode,
            };
            let rx = rx.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("compositor-{i}"))
                    .spawn(move || worker.run(&rx))?,
            );
        }
        drop(rx);

        let ticker_stop = stop.clone();
        let ticker_skipped = skipped.clone();
        let interval = self.refresh_interval;
        let ticker = thread::Builder::new()
            .name("render-ticker".into())
            .spawn(move || {
                let mut pass = 0u64;
                let mut next_tick = Instant::now();
                while !ticker_stop.load(Ordering::Acquire) {
                    pass += 1;
                    match tx.try_send(pass) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            ticker_skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                    next_tick += interval;
                    match next_tick.checked_duration_since(Instant::now()) {
                        Some(rest) => thread::park_timeout(rest),
                        None => next_tick = Instant::now(),
                    }
                }
            })?;

        log::debug!(
            "Render loop started: {worker_count} workers at {:.0} Hz ({:?})",
            1.0 / interval.as_secs_f64(),
            self.mode
        );
        Ok(RenderLoopHandle {
            stop,
            ticker: Some(ticker),
            workers,
            meter,
            skipped,
        })
    }
}

struct Worker {
    compositor: Compositor,
    feed: FeedReader,
    snapshots: SlotReader<DetectionSnapshot>,
    shared: Arc<RenderShared>,
    meter: Arc<Mutex<FrameRateMeter>>,
    mode: RenderMode,
}

impl Worker {
    fn run(mut self, passes: &Receiver<u64>) {
        for pass in passes.iter() {
            let latest = self.feed.latest_frame();
            let Some(frame) = latest.as_ref() else {
                continue;
            };
            let snapshot = self.snapshots.latest();
            let outcome = render_pass(pass, &self.compositor, frame, &snapshot, &self.shared, self.mode);
            if outcome == PassOutcome::Published {
                lock(&self.meter).tick(Instant::now());
            }
        }
    }
}

/// Owner of a running render loop.
pub struct RenderLoopHandle {
    stop: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    meter: Arc<Mutex<FrameRateMeter>>,
    skipped: Arc<AtomicU64>,
}

impl RenderLoopHandle {
    /// Published passes per second over the last second.
    pub fn fps(&self) -> f64 {
        lock(&self.meter).rate(Instant::now())
    }

    /// Ticks dropped because every worker was busy.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Stops ticking and waits briefly for workers. A worker still inside a
    /// verifier call is detached; its result still lands in the cache.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(ticker) = self.ticker.take() {
            ticker.thread().unpark();
            let _ = ticker.join();
        }
        let deadline = Instant::now() + STOP_GRACE;
        for worker in self.workers.drain(..) {
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                log::debug!("Compositor worker busy at shutdown; detaching");
            }
        }
    }
}

impl Drop for RenderLoopHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
