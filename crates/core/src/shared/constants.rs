/// Length of every face descriptor, observed or registered.
pub const DESCRIPTOR_DIM: usize = 128;

/// Multiplier applied to each descriptor component before rounding.
pub const QUANTIZATION_SCALE: f64 = 1000.0;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Blur standard deviation in pixels.
pub const DEFAULT_BLUR_INTENSITY: f64 = 8.0;

pub const DETECTION_INTERVAL_MS: u64 = 200;
pub const DEFAULT_REFRESH_HZ: u32 = 60;
pub const DEFAULT_COMPOSITOR_WORKERS: usize = 2;

pub const RECORDING_FPS: u32 = 30;
pub const RECORDING_CONTAINER: &str = "mp4";
pub const SNAPSHOT_JPEG_QUALITY: u8 = 95;

/// Outline colours (RGB) for the diagnostic overlay.
pub const MATCHED_OUTLINE_RGB: [u8; 3] = [0xef, 0x44, 0x44];
pub const UNMATCHED_OUTLINE_RGB: [u8; 3] = [0x22, 0xc5, 0x5e];
pub const OUTLINE_WIDTH: u32 = 2;

/// Path fragment that marks an HTTP source as a push-style image endpoint.
pub const IMAGE_PUSH_PATH: &str = "/video_feed";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
