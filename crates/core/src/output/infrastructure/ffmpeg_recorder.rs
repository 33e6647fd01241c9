use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::output::domain::recording_sink::{EncodedBlob, RecordingError, RecordingHandle, RecordingSink};
use crate::output::domain::surface::DisplaySurface;
use crate::shared::constants::RECORDING_CONTAINER;
use crate::shared::frame::Frame;

/// Records the display surface at a fixed rate into an MPEG-4 video.
///
/// Like a canvas capture stream, the recorder samples whatever is on screen
/// at each tick, so a slow compositor yields repeated frames rather than
/// gaps. The first captured frame fixes the video size; later frames of a
/// different size are skipped.
pub struct FfmpegRecorder {
    container: String,
}

impl FfmpegRecorder {
    /// `container` is a file extension ffmpeg can guess a muxer from.
    pub fn new(container: &str) -> Self {
        Self {
            container: container.trim_start_matches('.').to_ascii_lowercase(),
        }
    }
}

impl Default for FfmpegRecorder {
    fn default() -> Self {
        Self::new(RECORDING_CONTAINER)
    }
}

fn mime_for(container: &str) -> String {
    match container {
        "mkv" => "video/x-matroska".into(),
        "mov" => "video/quicktime".into(),
        "avi" => "video/x-msvideo".into(),
        other => format!("video/{other}"),
    }
}

impl RecordingSink for FfmpegRecorder {
    fn start(
        &mut self,
        surface: Arc<DisplaySurface>,
        frame_rate: u32,
    ) -> Result<Box<dyn RecordingHandle>, RecordingError> {
        let file = tempfile::Builder::new()
            .prefix("zkredact-recording-")
            .suffix(&format!(".{}", self.container))
            .tempfile()?;
        let path = file.path().to_path_buf();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let frame_rate = frame_rate.max(1);

        let thread = thread::Builder::new()
            .name("recorder".into())
            .spawn(move || capture(&surface, frame_rate, &path, &thread_stop))?;
        log::info!("Recording started at {frame_rate} fps");

        Ok(Box::new(FfmpegRecordingHandle {
            file,
            mime: mime_for(&self.container),
            stop,
            thread: Some(thread),
        }))
    }
}

fn capture(
    surface: &DisplaySurface,
    frame_rate: u32,
    path: &Path,
    stop: &AtomicBool,
) -> Result<usize, RecordingError> {
    let interval = Duration::from_secs_f64(1.0 / f64::from(frame_rate));
    let mut encoder: Option<VideoEncoder> = None;
    let mut captured = 0usize;
    let mut next_tick = Instant::now();

    while !stop.load(Ordering::Acquire) {
        if let Some(frame) = surface.current_frame().filter(|f| f.channels() == 3) {
            if encoder.is_none() {
                encoder = Some(VideoEncoder::open(path, frame.width(), frame.height(), frame_rate)?);
            }
            if let Some(enc) = encoder.as_mut() {
                if enc.accepts(&frame) {
                    enc.write(&frame)?;
                    captured += 1;
                } else {
                    log::debug!("Skipping {}x{} frame in recording", frame.width(), frame.height());
                }
            }
        }
        next_tick += interval;
        match next_tick.checked_duration_since(Instant::now()) {
            Some(rest) => thread::park_timeout(rest),
            None => next_tick = Instant::now(),
        }
    }

    match encoder {
        Some(enc) => {
            enc.finish()?;
            Ok(captured)
        }
        None => Err(RecordingError::NoFrames),
    }
}

impl From<ffmpeg_next::Error> for RecordingError {
    fn from(e: ffmpeg_next::Error) -> Self {
        RecordingError::Encode(e.to_string())
    }
}

struct FfmpegRecordingHandle {
    file: tempfile::NamedTempFile,
    mime: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<usize, RecordingError>>>,
}

impl FfmpegRecordingHandle {
    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(ref thread) = self.thread {
            thread.thread().unpark();
        }
    }
}

impl RecordingHandle for FfmpegRecordingHandle {
    fn stop(mut self: Box<Self>) -> Result<EncodedBlob, RecordingError> {
        self.request_stop();
        let thread = self
            .thread
            .take()
            .ok_or_else(|| RecordingError::Encode("recorder already stopped".into()))?;
        let frames = thread
            .join()
            .map_err(|_| RecordingError::Encode("recorder thread panicked".into()))??;
        let bytes = std::fs::read(self.file.path())?;
        log::info!("Recording stopped: {frames} frames, {} bytes", bytes.len());
        Ok(EncodedBlob::new(bytes, self.mime.clone()))
    }
}

impl Drop for FfmpegRecordingHandle {
    fn drop(&mut self) {
        self.request_stop();
    }
}

/// RGB24 frames in, MPEG-4 packets out.
struct VideoEncoder {
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    codec_time_base: ffmpeg_next::Rational,
    frame_count: i64,
}

impl VideoEncoder {
    fn open(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self, RecordingError> {
        ffmpeg_next::init()?;
        // 4:2:0 chroma needs even dimensions.
        let (out_w, out_h) = (width & !1, height & !1);
        if out_w == 0 || out_h == 0 {
            return Err(RecordingError::Encode(format!("{width}x{height} is too small to encode")));
        }

        let mut octx = ffmpeg_next::format::output(&path)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);
        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or(ffmpeg_next::Error::EncoderNotFound)?;
        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        let fps = i32::try_from(fps).unwrap_or(i32::MAX);
        let codec_time_base = ffmpeg_next::Rational(1, fps);
        encoder_ctx.set_width(out_w);
        encoder_ctx.set_height(out_h);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(codec_time_base);
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        octx.write_header()?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            out_w,
            out_h,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;
        log::debug!("Recorder encoding {out_w}x{out_h} at {fps} fps to {}", path.display());

        Ok(Self {
            octx,
            encoder,
            scaler,
            width,
            height,
            codec_time_base,
            frame_count: 0,
        })
    }

    fn accepts(&self, frame: &Frame) -> bool {
        frame.width() == self.width && frame.height() == self.height
    }

    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        let mut rgb = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.width,
            self.height,
        );
        let stride = rgb.stride(0);
        let row_len = self.width as usize * 3;
        let dst = rgb.data_mut(0);
        for (row, src) in frame.data().chunks_exact(row_len).enumerate() {
            dst[row * stride..row * stride + row_len].copy_from_slice(src);
        }

        let mut yuv = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(self.frame_count));
        self.encoder.send_frame(&yuv)?;
        self.drain()?;
        self.frame_count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<(), RecordingError> {
        self.encoder.send_eof()?;
        self.drain()?;
        self.octx.write_trailer()?;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), RecordingError> {
        let stream_time_base = self
            .octx
            .stream(0)
            .map(|s| s.time_base())
            .ok_or_else(|| RecordingError::Encode("output stream missing".into()))?;
        let mut packet = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.codec_time_base, stream_time_base);
            packet.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositing::compositor::Composition;
    use crate::compositing::stats::Stats;

    fn show(surface: &DisplaySurface, pass: u64, width: u32, height: u32) {
        surface.publish(
            pass,
            Composition {
                frame: Frame::new(vec![128; (width * height * 3) as usize], width, height, 3, 0),
                stats: Stats::default(),
            },
        );
    }

    fn decoded_size(bytes: &[u8], container: &str) -> (u32, u32) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("check.{container}"));
        std::fs::write(&path, bytes).unwrap();
        let ictx = ffmpeg_next::format::input(&path).unwrap();
        let stream = ictx.streams().best(ffmpeg_next::media::Type::Video).unwrap();
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .unwrap()
            .decoder()
            .video()
            .unwrap();
        (decoder.width(), decoder.height())
    }

    #[test]
    fn test_records_surface_into_video() {
        let surface = Arc::new(DisplaySurface::new());
        show(&surface, 1, 64, 48);

        let mut recorder = FfmpegRecorder::default();
        let handle = recorder.start(surface.clone(), 30).unwrap();
        thread::sleep(Duration::from_millis(150));
        show(&surface, 2, 64, 48);
        thread::sleep(Duration::from_millis(100));
        let blob = handle.stop().unwrap();

        assert_eq!(blob.mime, "video/mp4");
        assert!(!blob.is_empty());
        assert_eq!(decoded_size(&blob.bytes, "mp4"), (64, 48));
    }

    #[test]
    fn test_odd_sizes_are_cropped_to_even() {
        let surface = Arc::new(DisplaySurface::new());
        show(&surface, 1, 33, 21);
        let handle = FfmpegRecorder::default().start(surface, 30).unwrap();
        thread::sleep(Duration::from_millis(100));
        let blob = handle.stop().unwrap();
        assert_eq!(decoded_size(&blob.bytes, "mp4"), (32, 20));
    }

    #[test]
    fn test_empty_surface_yields_no_frames_error() {
        let surface = Arc::new(DisplaySurface::new());
        let handle = FfmpegRecorder::default().start(surface, 30).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(matches!(handle.stop(), Err(RecordingError::NoFrames)));
    }

    #[test]
    fn test_container_mime() {
        assert_eq!(mime_for("mp4"), "video/mp4");
        assert_eq!(mime_for("mkv"), "video/x-matroska");
        assert_eq!(FfmpegRecorder::new(".MKV").container, "mkv");
    }
}
