use std::fmt;

use thiserror::Error;

use crate::output::domain::recording_sink::{EncodedBlob, RecordingError};

use super::domain::frame_source::SourceError;
use super::domain::source_descriptor::SourceDescriptor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Starting,
    Playing,
    Recording,
    /// Acquisition or the running source failed; the cause is kept for display.
    Error(String),
}

impl StreamState {
    /// True while a source is (being) held.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Playing | Self::Recording)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Playing => "playing",
            Self::Recording => "recording",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(cause) => write!(f, "error: {cause}"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    StartRecording,
    StopRecording,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::StartRecording => "start recording",
            Self::StopRecording => "stop recording",
        })
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("cannot {action} while {from}")]
    InvalidTransition { from: &'static str, action: Action },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
}

/// The side effects the controller gates.
pub trait StreamBackend {
    /// Opens the source and starts detection over it.
    fn acquire(&mut self, descriptor: &SourceDescriptor) -> Result<(), SourceError>;

    /// Cancels detection and releases the source. Must tolerate being called
    /// when nothing is held.
    fn release(&mut self);

    fn begin_recording(&mut self) -> Result<(), RecordingError>;

    fn end_recording(&mut self) -> Result<EncodedBlob, RecordingError>;
}

/// Stream state machine:
///
/// ```text
/// Idle ──start──▶ Starting ──ok──▶ Playing ◀──stop_recording── Recording
///   ▲               │ err            │ start_recording ──────────▶ │
///   │               ▼                ▼                             │
///   └────stop──── Error ◀──failure── (any active state) ◀──────────┘
/// ```
///
/// Invalid requests are rejected with [`LifecycleError::InvalidTransition`]
/// instead of being silently ignored, except `start` on a running stream,
/// which is an idempotent no-op.
pub struct LifecycleController<B> {
    backend: B,
    state: StreamState,
    salvaged: Option<EncodedBlob>,
}

impl<B: StreamBackend> LifecycleController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: StreamState::Idle,
            salvaged: None,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn start(&mut self, descriptor: &SourceDescriptor) -> Result<(), LifecycleError> {
        match self.state {
            StreamState::Starting | StreamState::Playing | StreamState::Recording => {
                log::debug!("start ignored: stream already {}", self.state);
                return Ok(());
            }
            StreamState::Idle | StreamState::Error(_) => {}
        }

        self.transition(StreamState::Starting);
        match self.backend.acquire(descriptor) {
            Ok(()) => {
                self.transition(StreamState::Playing);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start {descriptor}: {e}");
                self.backend.release();
                self.transition(StreamState::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Returns the recording if one was running. A recording that fails to
    /// finalize is logged and dropped; the stop itself still succeeds.
    pub fn stop(&mut self) -> Result<Option<EncodedBlob>, LifecycleError> {
        let blob = match self.state {
            StreamState::Recording => match self.backend.end_recording() {
                Ok(blob) => Some(blob),
                Err(e) => {
                    log::warn!("Recording lost on stop: {e}");
                    None
                }
            },
            StreamState::Playing | StreamState::Error(_) => None,
            StreamState::Idle | StreamState::Starting => return Err(self.invalid(Action::Stop)),
        };
        self.backend.release();
        self.transition(StreamState::Idle);
        Ok(blob)
    }

    pub fn start_recording(&mut self) -> Result<(), LifecycleError> {
        if self.state != StreamState::Playing {
            return Err(self.invalid(Action::StartRecording));
        }
        self.backend.begin_recording()?;
        self.transition(StreamState::Recording);
        Ok(())
    }

    /// Always returns to `Playing`, even if encoding the recording failed.
    pub fn stop_recording(&mut self) -> Result<EncodedBlob, LifecycleError> {
        if self.state != StreamState::Recording {
            return Err(self.invalid(Action::StopRecording));
        }
        let result = self.backend.end_recording();
        self.transition(StreamState::Playing);
        Ok(result?)
    }

    /// Moves an active stream to `Error`, releasing the source. Returns false
    /// if there was nothing running to fail. A recording in progress is
    /// finalized and kept for [`take_salvaged_recording`](Self::take_salvaged_recording).
    pub fn report_failure(&mut self, cause: impl Into<String>) -> bool {
        if !self.state.is_active() {
            return false;
        }
        let cause = cause.into();
        if self.state == StreamState::Recording {
            match self.backend.end_recording() {
                Ok(blob) => {
                    log::warn!("Recording ended early by stream failure ({} bytes kept)", blob.len());
                    self.salvaged = Some(blob);
                }
                Err(e) => log::warn!("Recording lost on failure: {e}"),
            }
        }
        log::error!("Stream failed: {cause}");
        self.backend.release();
        self.transition(StreamState::Error(cause));
        true
    }

    /// The recording finalized when the stream failed while recording.
    pub fn take_salvaged_recording(&mut self) -> Option<EncodedBlob> {
        self.salvaged.take()
    }

    fn invalid(&self, action: Action) -> LifecycleError {
        LifecycleError::InvalidTransition {
            from: self.state.name(),
            action,
        }
    }

    fn transition(&mut self, next: StreamState) {
        log::debug!("Stream {} -> {}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Default)]
    struct StubBackend {
        fail_acquire: bool,
        fail_recording: bool,
        acquired: usize,
        released: usize,
        recordings_started: usize,
    }

    impl StreamBackend for StubBackend {
        fn acquire(&mut self, descriptor: &SourceDescriptor) -> Result<(), SourceError> {
            if self.fail_acquire {
                return Err(SourceError::open(descriptor, "device busy"));
            }
            self.acquired += 1;
            Ok(())
        }

        fn release(&mut self) {
            self.released += 1;
        }

        fn begin_recording(&mut self) -> Result<(), RecordingError> {
            self.recordings_started += 1;
            Ok(())
        }

        fn end_recording(&mut self) -> Result<EncodedBlob, RecordingError> {
            if self.fail_recording {
                return Err(RecordingError::NoFrames);
            }
            Ok(EncodedBlob::new(vec![1, 2, 3], "video/mp4"))
        }
    }

    fn device() -> SourceDescriptor {
        SourceDescriptor::CaptureDevice("0".into())
    }

    fn playing() -> LifecycleController<StubBackend> {
        let mut controller = LifecycleController::new(StubBackend::default());
        controller.start(&device()).unwrap();
        controller
    }

    #[test]
    fn test_start_moves_idle_to_playing() {
        let controller = playing();
        assert_eq!(controller.state(), &StreamState::Playing);
        assert_eq!(controller.backend().acquired, 1);
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let mut controller = playing();
        controller.start(&device()).unwrap();
        controller.start_recording().unwrap();
        controller.start(&device()).unwrap();
        assert_eq!(controller.state(), &StreamState::Recording);
        assert_eq!(controller.backend().acquired, 1);
    }

    #[test]
    fn test_acquisition_failure_enters_error_and_can_retry() {
        let mut controller = LifecycleController::new(StubBackend {
            fail_acquire: true,
            ..Default::default()
        });
        let err = controller.start(&device()).unwrap_err();
        assert!(matches!(err, LifecycleError::Source(_)));
        assert_eq!(
            controller.state(),
            &StreamState::Error("cannot open device 0: device busy".into())
        );

        controller.backend_mut().fail_acquire = false;
        controller.start(&device()).unwrap();
        assert_eq!(controller.state(), &StreamState::Playing);
    }

    #[rstest]
    #[case::idle(Action::StartRecording)]
    #[case::idle_stop_recording(Action::StopRecording)]
    #[case::idle_stop(Action::Stop)]
    fn test_invalid_from_idle(#[case] action: Action) {
        let mut controller = LifecycleController::new(StubBackend::default());
        let err = match action {
            Action::StartRecording => controller.start_recording().unwrap_err(),
            Action::StopRecording => controller.stop_recording().unwrap_err(),
            Action::Stop => controller.stop().unwrap_err(),
            Action::Start => unreachable!(),
        };
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition { from: "idle", action: a } if a == action
        ));
        assert_eq!(controller.state(), &StreamState::Idle);
        assert_eq!(controller.backend().released, 0);
    }

    #[test]
    fn test_invalid_transition_message() {
        let mut controller = LifecycleController::new(StubBackend::default());
        let err = controller.start_recording().unwrap_err();
        assert_eq!(err.to_string(), "cannot start recording while idle");
    }

    #[test]
    fn test_recording_round_trip_returns_to_playing() {
        let mut controller = playing();
        controller.start_recording().unwrap();
        assert_eq!(controller.state(), &StreamState::Recording);
        assert!(controller.start_recording().is_err());

        let blob = controller.stop_recording().unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert_eq!(controller.state(), &StreamState::Playing);
    }

    #[test]
    fn test_failed_recording_still_returns_to_playing() {
        let mut controller = playing();
        controller.start_recording().unwrap();
        controller.backend_mut().fail_recording = true;
        assert!(matches!(
            controller.stop_recording().unwrap_err(),
            LifecycleError::Recording(RecordingError::NoFrames)
        ));
        assert_eq!(controller.state(), &StreamState::Playing);
    }

    #[test]
    fn test_stop_while_recording_hands_back_recording() {
        let mut controller = playing();
        controller.start_recording().unwrap();
        let blob = controller.stop().unwrap();
        assert!(blob.is_some());
        assert_eq!(controller.state(), &StreamState::Idle);
        assert_eq!(controller.backend().released, 1);
    }

    #[test]
    fn test_failure_from_active_state_releases() {
        let mut controller = playing();
        assert!(controller.report_failure("stream dropped"));
        assert_eq!(controller.state(), &StreamState::Error("stream dropped".into()));
        assert_eq!(controller.backend().released, 1);
        assert!(!controller.report_failure("again"));

        assert!(controller.stop().unwrap().is_none());
        assert_eq!(controller.state(), &StreamState::Idle);
    }

    #[test]
    fn test_failure_from_idle_is_ignored() {
        let mut controller = LifecycleController::new(StubBackend::default());
        assert!(!controller.report_failure("nothing running"));
        assert_eq!(controller.state(), &StreamState::Idle);
    }

    #[test]
    fn test_failure_while_recording_keeps_recording() {
        let mut controller = playing();
        controller.start_recording().unwrap();
        assert!(controller.report_failure("stream dropped"));
        assert_eq!(controller.state(), &StreamState::Error("stream dropped".into()));

        let blob = controller.take_salvaged_recording().unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert!(controller.take_salvaged_recording().is_none());
        assert!(controller.stop().unwrap().is_none());
    }

    #[test]
    fn test_failed_finalize_on_failure_keeps_nothing() {
        let mut controller = playing();
        controller.start_recording().unwrap();
        controller.backend_mut().fail_recording = true;
        assert!(controller.report_failure("stream dropped"));
        assert!(controller.take_salvaged_recording().is_none());
    }
}
