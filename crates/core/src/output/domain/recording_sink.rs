use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use super::surface::DisplaySurface;

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("no frames were captured")]
    NoFrames,
    #[error("no recording in progress")]
    Inactive,
    #[error("encoder error: {0}")]
    Encode(String),
    #[error("recording I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoded media handed back by a sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl EncodedBlob {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Writes the blob next to `path` first and renames it into place, so a
    /// partial file never appears under the final name.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, &self.bytes)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Captures the display surface into a video.
pub trait RecordingSink: Send {
    fn start(
        &mut self,
        surface: Arc<DisplaySurface>,
        frame_rate: u32,
    ) -> Result<Box<dyn RecordingHandle>, RecordingError>;
}

pub trait RecordingHandle: Send {
    /// Ends capture and returns the finished container.
    fn stop(self: Box<Self>) -> Result<EncodedBlob, RecordingError>;
}
