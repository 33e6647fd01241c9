use std::cell::RefCell;

use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::shared::bounding_box::PixelRect;
use crate::shared::constants::DEFAULT_BLUR_INTENSITY;
use crate::shared::frame::Frame;

use super::gaussian::{self, BlurPlan};

/// CPU Gaussian blur of rectangular regions.
///
/// `intensity` is the standard deviation in pixels, the same unit as a CSS
/// `blur()` radius. Region and scratch buffers are reused across calls, so
/// one instance belongs to one worker thread.
pub struct CpuGaussianBlurrer {
    intensity: f64,
    plan: BlurPlan,
    roi_buf: RefCell<Vec<u8>>,
    blur_temp: RefCell<Vec<f32>>,
}

impl CpuGaussianBlurrer {
    /// Non-positive or non-finite intensities fall back to the default.
    pub fn new(intensity: f64) -> Self {
        let intensity = if intensity.is_finite() && intensity > 0.0 {
            intensity
        } else {
            DEFAULT_BLUR_INTENSITY
        };
        Self {
            intensity,
            plan: BlurPlan::new(intensity),
            roi_buf: RefCell::new(Vec::new()),
            blur_temp: RefCell::new(Vec::new()),
        }
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }
}

impl Default for CpuGaussianBlurrer {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_INTENSITY)
    }
}

impl FrameBlurrer for CpuGaussianBlurrer {
    fn blur(&self, frame: &mut Frame, regions: &[PixelRect]) -> Result<(), Box<dyn std::error::Error>> {
        let fw = frame.width() as usize;
        let fh = frame.height() as usize;
        let channels = frame.channels() as usize;
        let data = frame.data_mut();

        let mut roi = self.roi_buf.borrow_mut();
        let mut temp = self.blur_temp.borrow_mut();
        for &rect in regions {
            if rect.w == 0 || rect.h == 0 {
                continue;
            }
            if rect.right() > fw || rect.bottom() > fh {
                return Err(format!("region {rect:?} exceeds {fw}x{fh} frame").into());
            }
            log::trace!("Blurring {}x{} at ({}, {})", rect.w, rect.h, rect.x, rect.y);
            gaussian::extract_roi(data, fw, channels, rect, &mut roi);
            gaussian::blur_roi(&mut roi, rect.w, rect.h, channels, &self.plan, &mut temp);
            gaussian::write_roi_back(data, &roi, fw, channels, rect);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height * 3) as usize], width, height, 3, 7)
    }

    fn rect(x: usize, y: usize, w: usize, h: usize) -> PixelRect {
        PixelRect { x, y, w, h }
    }

    fn checkerboard(width: u32, height: u32) -> Frame {
        let mut f = frame(width, height, 0);
        let w = width as usize;
        for (i, px) in f.data_mut().chunks_mut(3).enumerate() {
            if (i % w + i / w) % 2 == 0 {
                px.fill(255);
            }
        }
        f
    }

    #[test]
    fn test_no_regions_leaves_frame() {
        let mut f = checkerboard(20, 20);
        let before = f.data().to_vec();
        CpuGaussianBlurrer::new(3.0).blur(&mut f, &[]).unwrap();
        assert_eq!(f.data(), &before[..]);
        assert_eq!(f.index(), 7);
    }

    #[test]
    fn test_region_is_smoothed_and_outside_untouched() {
        let mut f = checkerboard(40, 40);
        let before = f.data().to_vec();
        CpuGaussianBlurrer::new(3.0).blur(&mut f, &[rect(10, 10, 20, 20)]).unwrap();

        let at = |x: usize, y: usize| (y * 40 + x) * 3;
        // Checkerboard averages to mid-grey inside the region.
        let centre = f.data()[at(20, 20)];
        assert!((100..=155).contains(&centre), "centre was {centre}");
        assert_eq!(f.data()[at(0, 0)], before[at(0, 0)]);
        assert_eq!(f.data()[at(35, 35)], before[at(35, 35)]);
        assert_eq!(f.data()[at(9, 20)], before[at(9, 20)]);
    }

    #[test]
    fn test_multiple_regions_each_blurred() {
        let mut f = checkerboard(60, 30);
        CpuGaussianBlurrer::new(2.0)
            .blur(&mut f, &[rect(0, 0, 20, 20), rect(40, 5, 20, 20)])
            .unwrap();
        let at = |x: usize, y: usize| (y * 60 + x) * 3;
        assert!(f.data()[at(10, 10)] > 0 && f.data()[at(10, 10)] < 255);
        assert!(f.data()[at(50, 15)] > 0 && f.data()[at(50, 15)] < 255);
    }

    #[test]
    fn test_strong_blur_uses_downscale_path() {
        let blurrer = CpuGaussianBlurrer::new(40.0);
        assert!(blurrer.plan.scale > 1);
        let mut f = checkerboard(64, 64);
        blurrer.blur(&mut f, &[rect(0, 0, 64, 64)]).unwrap();
        let centre = f.data()[(32 * 64 + 32) * 3];
        assert!((90..=165).contains(&centre));
    }

    #[test]
    fn test_out_of_bounds_region_is_error() {
        let mut f = frame(10, 10, 0);
        assert!(CpuGaussianBlurrer::new(2.0).blur(&mut f, &[rect(5, 5, 10, 2)]).is_err());
    }

    #[test]
    fn test_invalid_intensity_falls_back_to_default() {
        assert_eq!(CpuGaussianBlurrer::new(0.0).intensity(), DEFAULT_BLUR_INTENSITY);
        assert_eq!(CpuGaussianBlurrer::new(-1.0).intensity(), DEFAULT_BLUR_INTENSITY);
        assert_eq!(CpuGaussianBlurrer::new(f64::NAN).intensity(), DEFAULT_BLUR_INTENSITY);
        assert_eq!(CpuGaussianBlurrer::new(12.0).intensity(), 12.0);
    }
}
