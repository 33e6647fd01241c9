use serde::{Deserialize, Serialize};

/// Face bounding box in source-frame pixel coordinates, as reported by the
/// detector. May extend past the frame edges or carry fractional values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer rectangle guaranteed to lie inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Snaps the box outward to whole pixels and clips it to the frame.
    ///
    /// Returns `None` when nothing of the box is visible.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        if !(self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite())
        {
            return None;
        }
        let fw = frame_width as f64;
        let fh = frame_height as f64;

        let x0 = self.x.floor().clamp(0.0, fw);
        let y0 = self.y.floor().clamp(0.0, fh);
        let x1 = (self.x + self.width).ceil().clamp(0.0, fw);
        let y1 = (self.y + self.height).ceil().clamp(0.0, fh);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect {
            x: x0 as usize,
            y: y0 as usize,
            w: (x1 - x0) as usize,
            h: (y1 - y0) as usize,
        })
    }
}

impl PixelRect {
    pub fn right(&self) -> usize {
        self.x + self.w
    }

    pub fn bottom(&self) -> usize {
        self.y + self.h
    }
}
