pub mod detection_snapshot;
pub mod face_detector;
pub mod observation;
