use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::detection::domain::detection_snapshot::DetectionSnapshot;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::constants::{DEFAULT_CONFIDENCE, DETECTION_INTERVAL_MS};
use crate::shared::latest_slot::SlotWriter;
use crate::stream::domain::feed::FeedReader;

pub type SnapshotWriter = SlotWriter<DetectionSnapshot>;

/// Called after every completed detector invocation with its duration and
/// the number of faces found.
pub type CycleObserver = Box<dyn Fn(Duration, usize) + Send>;

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionLoopConfig {
    pub confidence: f64,
    pub interval: Duration,
}

impl Default for DetectionLoopConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            interval: Duration::from_millis(DETECTION_INTERVAL_MS),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// The stop flag was set before the cycle began.
    Stopped,
    /// The source is not live or has no frame yet.
    Skipped,
    Published { snapshot_id: u64, faces: usize },
    /// Detection finished after the stop flag was set; result dropped.
    Discarded,
    /// The detector returned an error; the previous snapshot stays current.
    Failed,
}

/// Samples the live feed through the detector on a fixed cadence and
/// publishes each result as a new snapshot.
///
/// The loop is the only writer of the snapshot slot. It never waits on the
/// render path: publishing is a pointer swap.
pub struct DetectionLoop {
    detector: Box<dyn FaceDetector>,
    feed: FeedReader,
    snapshots: SnapshotWriter,
    config: DetectionLoopConfig,
    stopped: Arc<AtomicBool>,
    on_cycle: Option<CycleObserver>,
}

impl DetectionLoop {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        feed: FeedReader,
        snapshots: SnapshotWriter,
        config: DetectionLoopConfig,
    ) -> Self {
        Self {
            detector,
            feed,
            snapshots,
            config,
            stopped: Arc::new(AtomicBool::new(false)),
            on_cycle: None,
        }
    }

    pub fn with_observer(mut self, on_cycle: CycleObserver) -> Self {
        self.on_cycle = Some(on_cycle);
        self
    }

    /// Shared stop flag; setting it ends the loop at the next cycle boundary.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }

    /// Runs one detection cycle without the inter-cycle delay.
    pub fn cycle(&mut self) -> CycleOutcome {
        if self.stopped.load(Ordering::Acquire) {
            return CycleOutcome::Stopped;
        }
        if !self.feed.is_live() {
            return CycleOutcome::Skipped;
        }
        let latest = self.feed.latest_frame();
        let Some(frame) = latest.as_ref() else {
            return CycleOutcome::Skipped;
        };

        let captured_at = Instant::now();
        let observations = match self.detector.detect(frame, self.config.confidence) {
            Ok(observations) => observations,
            Err(e) => {
                log::warn!("Face detection failed on frame {}: {e}", frame.index());
                return CycleOutcome::Failed;
            }
        };
        let faces = observations.len();
        if let Some(ref on_cycle) = self.on_cycle {
            on_cycle(captured_at.elapsed(), faces);
        }

        if self.stopped.load(Ordering::Acquire) {
            log::debug!("Detection finished after stop; discarding {faces} observations");
            return CycleOutcome::Discarded;
        }

        let snapshot_id = self.snapshots.version() + 1;
        self.snapshots
            .publish(DetectionSnapshot::new(snapshot_id, observations, captured_at));
        CycleOutcome::Published { snapshot_id, faces }
    }

    /// Moves the loop onto its own thread.
    pub fn spawn(mut self) -> std::io::Result<DetectionLoopHandle> {
        let stopped = self.stopped.clone();
        let interval = self.config.interval;
        let join = thread::Builder::new()
            .name("detection-loop".into())
            .spawn(move || {
                log::debug!("Detection loop started ({interval:?} cadence)");
                loop {
                    if self.cycle() == CycleOutcome::Stopped {
                        break;
                    }
                    thread::park_timeout(interval);
                }
                log::debug!("Detection loop stopped");
                self.detector
            })?;
        Ok(DetectionLoopHandle {
            stopped,
            join: Some(join),
        })
    }
}

/// Owner of a running detection loop thread.
///
/// Dropping the handle requests a stop without waiting for it.
pub struct DetectionLoopHandle {
    stopped: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<Box<dyn FaceDetector>>>,
}

impl DetectionLoopHandle {
    /// Requests a stop, waits for any in-flight detection to finish and hands
    /// the detector back so a later start can reuse it.
    pub fn stop(mut self) -> Option<Box<dyn FaceDetector>> {
        self.request_stop();
        let join = self.join.take()?;
        match join.join() {
            Ok(detector) => Some(detector),
            Err(_) => {
                log::error!("Detection loop thread panicked");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(ref join) = self.join {
            join.thread().unpark();
        }
    }
}

impl Drop for DetectionLoopHandle {
    fn drop(&mut self) {
        self.request_stop();
    }
}
