use crate::detection::domain::observation::Observation;
use crate::shared::frame::Frame;

/// Domain interface for the face detection capability.
///
/// Implementations may hold model state, hence `&mut self`. Only the
/// detection loop calls this.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f64,
    ) -> Result<Vec<Observation>, Box<dyn std::error::Error>>;
}
