use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::output::domain::recording_sink::EncodedBlob;
use crate::output::domain::snapshot_exporter::{ExportError, SnapshotExporter};
use crate::output::domain::surface::DisplaySurface;
use crate::shared::constants::SNAPSHOT_JPEG_QUALITY;
use crate::shared::frame::Frame;

pub struct JpegSnapshotExporter {
    quality: u8,
}

impl JpegSnapshotExporter {
    /// `quality` is clamped to the encoder's 1..=100 range.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ExportError> {
        let (w, h) = (frame.width(), frame.height());
        let mut out = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
            match frame.channels() {
                1 => encoder.encode(frame.data(), w, h, ExtendedColorType::L8)?,
                4 => {
                    // JPEG has no alpha channel.
                    let rgb: Vec<u8> = frame
                        .data()
                        .chunks_exact(4)
                        .flat_map(|px| [px[0], px[1], px[2]])
                        .collect();
                    encoder.encode(&rgb, w, h, ExtendedColorType::Rgb8)?
                }
                _ => encoder.encode(frame.data(), w, h, ExtendedColorType::Rgb8)?,
            }
        }
        Ok(out)
    }
}

impl Default for JpegSnapshotExporter {
    fn default() -> Self {
        Self::new(SNAPSHOT_JPEG_QUALITY)
    }
}

impl SnapshotExporter for JpegSnapshotExporter {
    fn capture(&self, surface: &DisplaySurface) -> Result<EncodedBlob, ExportError> {
        let frame = surface.current_frame().ok_or(ExportError::EmptySurface)?;
        let bytes = self.encode(&frame)?;
        log::info!(
            "Captured {}x{} snapshot ({} bytes)",
            frame.width(),
            frame.height(),
            bytes.len()
        );
        Ok(EncodedBlob::new(bytes, "image/jpeg"))
    }
}
