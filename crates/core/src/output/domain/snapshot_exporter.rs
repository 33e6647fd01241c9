use thiserror::Error;

use super::recording_sink::EncodedBlob;
use super::surface::DisplaySurface;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("nothing is on screen yet")]
    EmptySurface,
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Encodes what is currently on the display surface as a still image.
pub trait SnapshotExporter: Send + Sync {
    fn capture(&self, surface: &DisplaySurface) -> Result<EncodedBlob, ExportError>;
}
