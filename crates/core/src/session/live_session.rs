use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::blurring::infrastructure::cpu_gaussian_blurrer::CpuGaussianBlurrer;
use crate::compositing::compositor::Compositor;
use crate::detection::detection_loop::{DetectionLoop, DetectionLoopConfig, DetectionLoopHandle};
use crate::detection::domain::detection_snapshot::DetectionSnapshot;
use crate::detection::domain::face_detector::FaceDetector;
use crate::matching::domain::face_verifier::FaceVerifier;
use crate::matching::domain::registry::IdentityRegistry;
use crate::matching::match_engine::MatchEngine;
use crate::output::domain::recording_sink::{EncodedBlob, RecordingError, RecordingHandle, RecordingSink};
use crate::output::domain::snapshot_exporter::{ExportError, SnapshotExporter};
use crate::output::domain::surface::DisplaySurface;
use crate::shared::latest_slot::latest_slot;
use crate::stream::domain::feed::FeedStatus;
use crate::stream::domain::frame_source::{FrameSource, SourceError, SourceHandle};
use crate::stream::domain::source_descriptor::SourceDescriptor;
use crate::stream::lifecycle::{LifecycleController, LifecycleError, StreamBackend, StreamState};

use super::render_loop::{RenderLoop, RenderLoopHandle, RenderMode, RenderShared, SharedLogger};
use super::session_config::{ConfigError, SessionConfig};
use super::session_logger::SessionLogger;

/// Builds the detector on first start. A failure disables redaction for
/// the session instead of failing the start.
pub type DetectorFactory =
    Box<dyn FnMut() -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> + Send>;

/// External collaborators of a session.
pub struct SessionDeps {
    pub frame_source: Box<dyn FrameSource>,
    pub detector: DetectorFactory,
    pub verifier: Arc<dyn FaceVerifier>,
    pub registry: Arc<dyn IdentityRegistry>,
    pub recorder: Box<dyn RecordingSink>,
    pub exporter: Box<dyn SnapshotExporter>,
    pub logger: Box<dyn SessionLogger>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub faces_detected: usize,
    pub faces_blurred: usize,
    /// Compositor passes published over the last second.
    pub fps: f64,
}

/// A live redaction session: one source at a time, gated by the stream
/// lifecycle.
pub struct LiveSession {
    controller: LifecycleController<SessionBackend>,
    exporter: Box<dyn SnapshotExporter>,
}

impl LiveSession {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Result<Self, ConfigError> {
        config.validate()?;
        let logger: SharedLogger = Arc::new(Mutex::new(deps.logger));
        let shared = Arc::new(RenderShared {
            engine: Arc::new(MatchEngine::new(deps.verifier, config.cache_policy)),
            registry: deps.registry,
            surface: Arc::new(DisplaySurface::new()),
            logger,
        });
        let backend = SessionBackend {
            config,
            source: deps.frame_source,
            detector_factory: deps.detector,
            detector: None,
            detector_error: None,
            shared,
            recorder: deps.recorder,
            running: None,
            recording: None,
        };
        Ok(Self {
            controller: LifecycleController::new(backend),
            exporter: deps.exporter,
        })
    }

    /// Parses `source` and starts streaming from it. An empty source is
    /// rejected without touching the stream state.
    pub fn start(&mut self, source: &str) -> Result<(), LifecycleError> {
        let descriptor = SourceDescriptor::parse(source)?;
        self.controller.start(&descriptor)
    }

    pub fn start_descriptor(&mut self, descriptor: &SourceDescriptor) -> Result<(), LifecycleError> {
        self.controller.start(descriptor)
    }

    /// Returns the recording if one was still running.
    pub fn stop(&mut self) -> Result<Option<EncodedBlob>, LifecycleError> {
        self.controller.stop()
    }

    pub fn start_recording(&mut self) -> Result<(), LifecycleError> {
        self.controller.start_recording()
    }

    pub fn stop_recording(&mut self) -> Result<EncodedBlob, LifecycleError> {
        self.controller.stop_recording()
    }

    /// The recording that was running when the source failed, if any.
    pub fn take_salvaged_recording(&mut self) -> Option<EncodedBlob> {
        self.controller.take_salvaged_recording()
    }

    pub fn take_snapshot(&self) -> Result<EncodedBlob, ExportError> {
        self.exporter.capture(&self.surface())
    }

    /// Moves the stream to `Error` if a live source has dropped. Returns
    /// true when that happened. Files that reach their end keep showing the
    /// last frame.
    pub fn check_source(&mut self) -> bool {
        let dropped = self
            .controller
            .backend()
            .running
            .as_ref()
            .filter(|r| r.handle.descriptor().is_live())
            .is_some_and(|r| r.handle.feed().status() == FeedStatus::Ended);
        dropped && self.controller.report_failure("source disconnected")
    }

    pub fn state(&self) -> &StreamState {
        self.controller.state()
    }

    /// Feed status of the running source, if any.
    pub fn source_status(&self) -> Option<FeedStatus> {
        self.controller
            .backend()
            .running
            .as_ref()
            .map(|r| r.handle.feed().status())
    }

    /// Why redaction is disabled, if the detector could not be created.
    pub fn detector_error(&self) -> Option<&str> {
        self.controller.backend().detector_error.as_deref()
    }

    pub fn stats(&self) -> SessionStats {
        let backend = self.controller.backend();
        let stats = backend.shared.surface.stats();
        SessionStats {
            faces_detected: stats.faces_detected,
            faces_blurred: stats.faces_blurred,
            fps: backend.running.as_ref().map_or(0.0, |r| r.render.fps()),
        }
    }

    pub fn surface(&self) -> Arc<DisplaySurface> {
        self.controller.backend().shared.surface.clone()
    }

    pub fn engine(&self) -> Arc<MatchEngine> {
        self.controller.backend().shared.engine.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.controller.backend().config
    }

    /// Logs the session logger's summary.
    pub fn summary(&self) {
        let backend = self.controller.backend();
        let mut logger = backend
            .shared
            .logger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let engine = &backend.shared.engine;
        logger.metric("cached_matches", engine.cached_matches() as f64);
        logger.metric("verifier_failures", engine.verifier_failures() as f64);
        logger.summary();
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if self.controller.state() != &StreamState::Idle {
            let _ = self.controller.stop();
        }
    }
}

struct Running {
    handle: Box<dyn SourceHandle>,
    detection: Option<DetectionLoopHandle>,
    render: RenderLoopHandle,
}

struct SessionBackend {
    config: SessionConfig,
    source: Box<dyn FrameSource>,
    detector_factory: DetectorFactory,
    detector: Option<Box<dyn FaceDetector>>,
    detector_error: Option<String>,
    shared: Arc<RenderShared>,
    recorder: Box<dyn RecordingSink>,
    running: Option<Running>,
    recording: Option<Box<dyn RecordingHandle>>,
}

impl SessionBackend {
    fn take_detector(&mut self) -> Option<Box<dyn FaceDetector>> {
        if self.detector.is_none() && self.detector_error.is_none() {
            match (self.detector_factory)() {
                Ok(detector) => self.detector = Some(detector),
                Err(e) => {
                    log::error!("Face detection unavailable, showing frames unredacted: {e}");
                    self.detector_error = Some(e.to_string());
                }
            }
        }
        self.detector.take()
    }

    fn compositor(&self) -> Compositor {
        let compositor = Compositor::new(Box::new(CpuGaussianBlurrer::new(
            self.config.effective_blur_intensity(),
        )));
        if self.config.outlines {
            compositor
        } else {
            compositor.without_outlines()
        }
    }

    fn detection_observer(&self) -> Box<dyn Fn(std::time::Duration, usize) + Send> {
        let logger = self.shared.logger.clone();
        Box::new(move |elapsed, faces| {
            let mut logger = logger.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            logger.timing("detect", elapsed.as_secs_f64() * 1000.0);
            logger.metric("faces_found", faces as f64);
        })
    }
}

impl StreamBackend for SessionBackend {
    fn acquire(&mut self, descriptor: &SourceDescriptor) -> Result<(), SourceError> {
        let handle = self.source.start(descriptor)?;
        let (snapshot_writer, snapshot_reader) = latest_slot(DetectionSnapshot::empty());

        let (detection, mode) = match self.take_detector() {
            Some(detector) => {
                let config = DetectionLoopConfig {
                    confidence: self.config.confidence,
                    interval: self.config.detection_interval(),
                };
                let detection = DetectionLoop::new(detector, handle.feed(), snapshot_writer, config)
                    .with_observer(self.detection_observer())
                    .spawn()
                    .map_err(|e| SourceError::open(descriptor, e))?;
                (Some(detection), RenderMode::Redact)
            }
            None => (None, RenderMode::Passthrough),
        };

        let compositors = (0..self.config.compositor_workers)
            .map(|_| self.compositor())
            .collect();
        let render = match RenderLoop::new(
            self.shared.clone(),
            compositors,
            handle.feed(),
            snapshot_reader,
            self.config.refresh_interval(),
            mode,
        )
        .spawn()
        {
            Ok(render) => render,
            Err(e) => {
                if let Some(detection) = detection {
                    self.detector = detection.stop();
                }
                handle.stop();
                return Err(SourceError::open(descriptor, e));
            }
        };

        self.shared.surface.clear();
        self.running = Some(Running {
            handle,
            detection,
            render,
        });
        Ok(())
    }

    fn release(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        if let Some(detection) = running.detection {
            // Keep the detector for the next start.
            self.detector = detection.stop();
        }
        running.render.stop();
        running.handle.stop();
        self.shared.surface.clear();
    }

    fn begin_recording(&mut self) -> Result<(), RecordingError> {
        let handle = self
            .recorder
            .start(self.shared.surface.clone(), self.config.recording_fps)?;
        self.recording = Some(handle);
        Ok(())
    }

    fn end_recording(&mut self) -> Result<EncodedBlob, RecordingError> {
        self.recording.take().ok_or(RecordingError::Inactive)?.stop()
    }
}
