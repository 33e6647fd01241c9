use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::observation::{Descriptor, Observation};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// A recorded detection with the detector's confidence score.
#[derive(Clone, Debug, Deserialize)]
pub struct RecordedFace {
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
    pub descriptor: Descriptor,
    #[serde(default = "full_confidence")]
    pub score: f64,
}

fn full_confidence() -> f64 {
    1.0
}

/// Replays pre-computed detections by frame index.
///
/// Recordings are sparse (a detector samples far fewer frames than the source
/// produces), so a frame is answered with the most recent recording at or
/// before its index. Faces scoring below the requested confidence threshold
/// are dropped, as a live model would.
pub struct ReplayFaceDetector {
    recording: Arc<BTreeMap<usize, Vec<RecordedFace>>>,
}

impl ReplayFaceDetector {
    pub fn new(recording: Arc<BTreeMap<usize, Vec<RecordedFace>>>) -> Self {
        Self { recording }
    }

    /// Loads a JSON object mapping frame indices to face lists.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read detections {}: {e}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let raw: BTreeMap<String, Vec<RecordedFace>> = serde_json::from_str(json)?;
        let mut recording = BTreeMap::new();
        for (key, faces) in raw {
            let index: usize = key
                .parse()
                .map_err(|_| format!("invalid frame index key: {key:?}"))?;
            recording.insert(index, faces);
        }
        log::info!("Loaded recorded detections for {} frames", recording.len());
        Ok(Self::new(Arc::new(recording)))
    }
}

impl FaceDetector for ReplayFaceDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f64,
    ) -> Result<Vec<Observation>, Box<dyn std::error::Error>> {
        let Some((_, faces)) = self.recording.range(..=frame.index()).next_back() else {
            return Ok(Vec::new());
        };
        Ok(faces
            .iter()
            .filter(|f| f.score >= confidence_threshold)
            .map(|f| Observation::new(f.bounding_box, f.descriptor.clone()))
            .collect())
    }
}
