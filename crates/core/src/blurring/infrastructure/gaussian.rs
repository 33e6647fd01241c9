use crate::shared::bounding_box::PixelRect;

/// Kernels wider than this are applied to a downscaled copy of the region.
const MAX_DIRECT_KERNEL: usize = 50;

/// Normalised 1D Gaussian kernel for standard deviation `sigma`.
///
/// The kernel spans ±3σ, so its length is `2 * ceil(3σ) + 1`. A sigma at or
/// below zero yields the identity kernel `[1.0]`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    if sigma.is_nan() || sigma <= 0.0 {
        return vec![1.0];
    }
    let half = (3.0 * sigma).ceil() as usize;
    let weights: Vec<f64> = (0..=2 * half)
        .map(|i| {
            let x = i as f64 - half as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|&w| (w / sum) as f32).collect()
}

/// Precomputed kernels for one blur strength.
///
/// Large sigmas blur a region downscaled by `scale` with a proportionally
/// smaller kernel, then upscale it back. The result is visually equivalent
/// and far cheaper for the strengths used to anonymise faces.
#[derive(Clone, Debug)]
pub struct BlurPlan {
    pub kernel: Vec<f32>,
    pub small_kernel: Vec<f32>,
    pub scale: usize,
}

impl BlurPlan {
    pub fn new(sigma: f64) -> Self {
        let kernel = gaussian_kernel(sigma);
        let scale = (kernel.len() / MAX_DIRECT_KERNEL).max(1);
        let small_kernel = if scale > 1 {
            gaussian_kernel(sigma / scale as f64)
        } else {
            kernel.clone()
        };
        Self {
            kernel,
            small_kernel,
            scale,
        }
    }
}

/// Separable Gaussian blur over a packed `width * height * channels` buffer.
/// Edges are clamped. `temp` is reused between calls.
pub fn separable_blur(
    data: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    temp: &mut Vec<f32>,
) {
    if kernel.len() <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = (kernel.len() / 2) as isize;
    temp.resize(width * height * channels, 0.0);

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    let sx = (x as isize + k as isize - half).clamp(0, width as isize - 1) as usize;
                    sum += data[(y * width + sx) * channels + c] as f32 * w;
                }
                temp[(y * width + x) * channels + c] = sum;
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    let sy = (y as isize + k as isize - half).clamp(0, height as isize - 1) as usize;
                    sum += temp[(sy * width + x) * channels + c] * w;
                }
                data[(y * width + x) * channels + c] = sum.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Copies `rect` out of a frame buffer into `roi`.
pub fn extract_roi(data: &[u8], frame_width: usize, channels: usize, rect: PixelRect, roi: &mut Vec<u8>) {
    let row_len = rect.w * channels;
    roi.resize(row_len * rect.h, 0);
    for row in 0..rect.h {
        let src = ((rect.y + row) * frame_width + rect.x) * channels;
        roi[row * row_len..(row + 1) * row_len].copy_from_slice(&data[src..src + row_len]);
    }
}

/// Writes `roi` back into the frame buffer at `rect`.
pub fn write_roi_back(data: &mut [u8], roi: &[u8], frame_width: usize, channels: usize, rect: PixelRect) {
    let row_len = rect.w * channels;
    for row in 0..rect.h {
        let dst = ((rect.y + row) * frame_width + rect.x) * channels;
        data[dst..dst + row_len].copy_from_slice(&roi[row * row_len..(row + 1) * row_len]);
    }
}

/// Blurs a region buffer in place following `plan`.
pub fn blur_roi(roi: &mut [u8], rw: usize, rh: usize, channels: usize, plan: &BlurPlan, temp: &mut Vec<f32>) {
    let scale = plan.scale;
    if scale <= 1 || rw < scale * 2 || rh < scale * 2 {
        separable_blur(roi, rw, rh, channels, &plan.kernel, temp);
        return;
    }
    let (mut small, sw, sh) = downscale(roi, rw, rh, channels, scale);
    separable_blur(&mut small, sw, sh, channels, &plan.small_kernel, temp);
    let restored = upscale(&small, sw, sh, channels, rw, rh);
    roi[..restored.len()].copy_from_slice(&restored);
}

/// Area-average downscale by an integer factor.
pub fn downscale(data: &[u8], width: usize, height: usize, channels: usize, scale: usize) -> (Vec<u8>, usize, usize) {
    let (new_w, new_h) = (width / scale, height / scale);
    let mut out = vec![0u8; new_w * new_h * channels];
    let area = (scale * scale) as u32;

    for y in 0..new_h {
        for x in 0..new_w {
            for c in 0..channels {
                let mut sum = 0u32;
                for dy in 0..scale {
                    for dx in 0..scale {
                        sum += data[((y * scale + dy) * width + x * scale + dx) * channels + c] as u32;
                    }
                }
                out[(y * new_w + x) * channels + c] = (sum / area) as u8;
            }
        }
    }
    (out, new_w, new_h)
}

/// Bilinear upscale to `target_w * target_h`.
pub fn upscale(data: &[u8], width: usize, height: usize, channels: usize, target_w: usize, target_h: usize) -> Vec<u8> {
    let mut out = vec![0u8; target_w * target_h * channels];
    let sx_step = (width as f32 - 1.0) / (target_w as f32 - 1.0).max(1.0);
    let sy_step = (height as f32 - 1.0) / (target_h as f32 - 1.0).max(1.0);

    for y in 0..target_h {
        let src_y = y as f32 * sy_step;
        let y0 = (src_y.floor() as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fy = src_y - y0 as f32;
        for x in 0..target_w {
            let src_x = x as f32 * sx_step;
            let x0 = (src_x.floor() as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let fx = src_x - x0 as f32;
            for c in 0..channels {
                let px = |yy: usize, xx: usize| data[(yy * width + xx) * channels + c] as f32;
                let top = px(y0, x0) * (1.0 - fx) + px(y0, x1) * fx;
                let bottom = px(y1, x0) * (1.0 - fx) + px(y1, x1) * fx;
                out[(y * target_w + x) * channels + c] =
                    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}
