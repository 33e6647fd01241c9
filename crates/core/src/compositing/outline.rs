use ndarray::s;

use crate::shared::bounding_box::PixelRect;
use crate::shared::constants::{MATCHED_OUTLINE_RGB, OUTLINE_WIDTH, UNMATCHED_OUTLINE_RGB};
use crate::shared::frame::Frame;

/// Stroke colour and width of a diagnostic box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutlineStyle {
    pub rgb: [u8; 3],
    pub width: u32,
}

impl OutlineStyle {
    pub fn matched() -> Self {
        Self {
            rgb: MATCHED_OUTLINE_RGB,
            width: OUTLINE_WIDTH,
        }
    }

    pub fn unmatched() -> Self {
        Self {
            rgb: UNMATCHED_OUTLINE_RGB,
            width: OUTLINE_WIDTH,
        }
    }
}

/// Strokes the border of `rect` inward by `style.width` pixels.
///
/// Only the colour channels are written; a fourth (alpha) channel is left
/// as is. Single-channel frames receive the colour's luma.
pub fn draw_outline(frame: &mut Frame, rect: PixelRect, style: OutlineStyle) {
    if rect.w == 0 || rect.h == 0 || style.width == 0 {
        return;
    }
    let channels = frame.channels() as usize;
    let colour: Vec<u8> = if channels >= 3 {
        style.rgb.to_vec()
    } else {
        vec![luma(style.rgb)]
    };

    let t = (style.width as usize).min(rect.w.div_ceil(2)).min(rect.h.div_ceil(2));
    let (x0, y0, x1, y1) = (rect.x, rect.y, rect.right(), rect.bottom());
    let bands = [
        (y0, y0 + t, x0, x1),
        (y1 - t, y1, x0, x1),
        (y0, y1, x0, x0 + t),
        (y0, y1, x1 - t, x1),
    ];

    let mut pixels = frame.as_ndarray_mut();
    for (top, bottom, left, right) in bands {
        for (c, &value) in colour.iter().enumerate() {
            pixels.slice_mut(s![top..bottom, left..right, c]).fill(value);
        }
    }
}

fn luma([r, g, b]: [u8; 3]) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32, channels: u8) -> Frame {
        Frame::new(vec![0; (width * height) as usize * channels as usize], width, height, channels, 0)
    }

    fn pixel(frame: &Frame, x: usize, y: usize) -> Vec<u8> {
        let arr = frame.as_ndarray();
        (0..frame.channels() as usize).map(|c| arr[[y, x, c]]).collect()
    }

    #[test]
    fn test_border_painted_interior_untouched() {
        let mut f = blank(20, 20, 3);
        draw_outline(&mut f, PixelRect { x: 5, y: 5, w: 10, h: 8 }, OutlineStyle::matched());

        assert_eq!(pixel(&f, 5, 5), MATCHED_OUTLINE_RGB.to_vec());
        assert_eq!(pixel(&f, 6, 6), MATCHED_OUTLINE_RGB.to_vec());
        assert_eq!(pixel(&f, 14, 12), MATCHED_OUTLINE_RGB.to_vec());
        assert_eq!(pixel(&f, 10, 9), vec![0, 0, 0]);
        assert_eq!(pixel(&f, 7, 7), vec![0, 0, 0]);
        assert_eq!(pixel(&f, 4, 5), vec![0, 0, 0]);
        assert_eq!(pixel(&f, 15, 5), vec![0, 0, 0]);
    }

    #[test]
    fn test_styles_differ() {
        assert_ne!(OutlineStyle::matched().rgb, OutlineStyle::unmatched().rgb);
        assert_eq!(OutlineStyle::unmatched().rgb, [0x22, 0xc5, 0x5e]);
    }

    #[test]
    fn test_alpha_channel_preserved() {
        let mut f = Frame::new(vec![9; 6 * 6 * 4], 6, 6, 4, 0);
        draw_outline(&mut f, PixelRect { x: 0, y: 0, w: 6, h: 6 }, OutlineStyle::unmatched());
        assert_eq!(pixel(&f, 0, 0), vec![0x22, 0xc5, 0x5e, 9]);
    }

    #[test]
    fn test_tiny_rect_filled_without_panic() {
        let mut f = blank(4, 4, 3);
        draw_outline(&mut f, PixelRect { x: 3, y: 3, w: 1, h: 1 }, OutlineStyle::matched());
        assert_eq!(pixel(&f, 3, 3), MATCHED_OUTLINE_RGB.to_vec());
    }

    #[test]
    fn test_grayscale_frame_gets_luma() {
        let mut f = blank(4, 4, 1);
        draw_outline(&mut f, PixelRect { x: 0, y: 0, w: 4, h: 4 }, OutlineStyle::matched());
        assert_eq!(pixel(&f, 0, 0), vec![luma(MATCHED_OUTLINE_RGB)]);
    }
}
