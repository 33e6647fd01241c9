use crate::shared::bounding_box::PixelRect;
use crate::shared::frame::Frame;

/// Applies blur to rectangular regions of a frame, in place.
///
/// Regions are already clipped to the frame. Implementations may keep
/// scratch buffers, so an instance is owned by a single worker.
pub trait FrameBlurrer: Send {
    fn blur(&self, frame: &mut Frame, regions: &[PixelRect]) -> Result<(), Box<dyn std::error::Error>>;
}
