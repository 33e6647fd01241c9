use std::path::Path;
use std::time::Duration;

use crate::shared::frame::Frame;
use crate::stream::domain::frame_source::SourceError;
use crate::stream::domain::source_descriptor::SourceDescriptor;

use super::threaded_frame_source::FrameProducer;

const REPEAT_INTERVAL: Duration = Duration::from_millis(100);

/// A picture file presented as a live source that never ends.
///
/// The same pixels are re-emitted with increasing frame indices so the
/// render loop sees a steady feed.
pub struct StillImageStream {
    picture: Frame,
    frame_index: usize,
}

impl StillImageStream {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let image = image::open(path)
            .map_err(|e| SourceError::open(&SourceDescriptor::File(path.to_path_buf()), e))?;
        let picture = Frame::from_rgb_image(image.to_rgb8(), 0);
        log::info!(
            "Loaded still image {} ({}x{})",
            path.display(),
            picture.width(),
            picture.height()
        );
        Ok(Self {
            picture,
            frame_index: 0,
        })
    }
}

impl FrameProducer for StillImageStream {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let frame = Frame::new(
            self.picture.data().to_vec(),
            self.picture.width(),
            self.picture.height(),
            3,
            self.frame_index,
        );
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn pacing(&self) -> Option<Duration> {
        Some(REPEAT_INTERVAL)
    }
}
