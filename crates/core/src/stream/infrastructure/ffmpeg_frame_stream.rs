use std::time::Duration;

use crate::shared::frame::Frame;
use crate::stream::domain::frame_source::SourceError;
use crate::stream::domain::source_descriptor::SourceDescriptor;

use super::threaded_frame_source::FrameProducer;

/// Demuxers tried, in order, for capture devices.
const CAPTURE_FORMATS: &[&str] = &["v4l2", "avfoundation", "dshow"];

/// Fallback rate for files whose container reports none.
const DEFAULT_FILE_FPS: f64 = 30.0;

/// Continuous decode of a video file, network stream or capture device via
/// ffmpeg-next, converting every frame to RGB24.
pub struct FfmpegFrameStream {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
    pacing: Option<Duration>,
}

// Safety: the stream is moved into a single producer thread and never shared.
unsafe impl Send for FfmpegFrameStream {}

impl FfmpegFrameStream {
    pub fn open(descriptor: &SourceDescriptor) -> Result<Self, SourceError> {
        let fail = |e: &dyn std::fmt::Display| SourceError::open(descriptor, e);
        ffmpeg_next::init().map_err(|e| fail(&e))?;

        let ictx = match descriptor {
            SourceDescriptor::File(path) => ffmpeg_next::format::input(path),
            SourceDescriptor::NetworkStream(url) => ffmpeg_next::format::input(url),
            SourceDescriptor::CaptureDevice(name) => open_capture_device(name),
            SourceDescriptor::ImagePush(_) => {
                return Err(fail(&"push endpoints are fetched, not demuxed"));
            }
        }
        .map_err(|e| fail(&e))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| fail(&"no video stream found"))?;
        let video_stream_index = stream.index();
        let rate = stream.rate();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| fail(&e))?;
        let decoder = codec_ctx.decoder().video().map_err(|e| fail(&e))?;
        let (width, height) = (decoder.width(), decoder.height());

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| fail(&e))?;

        let pacing = if descriptor.is_live() {
            None
        } else {
            let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                DEFAULT_FILE_FPS
            };
            Some(Duration::from_secs_f64(1.0 / fps))
        };
        log::info!("Opened {descriptor}: {width}x{height}");

        Ok(Self {
            ictx,
            decoder,
            scaler,
            width,
            height,
            video_stream_index,
            frame_index: 0,
            flushing: false,
            pacing,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb)?;
        let frame = Frame::new(
            packed_rgb(&rgb, self.width, self.height),
            self.width,
            self.height,
            3,
            self.frame_index,
        );
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

fn open_capture_device(name: &str) -> Result<ffmpeg_next::format::context::Input, ffmpeg_next::Error> {
    ffmpeg_next::device::register_all();
    let format = ffmpeg_next::device::input::video()
        .find(|f| CAPTURE_FORMATS.contains(&f.name()))
        .ok_or(ffmpeg_next::Error::DemuxerNotFound)?;
    let ctx = ffmpeg_next::format::open_with(&name, &format, ffmpeg_next::Dictionary::new())?;
    match ctx {
        ffmpeg_next::format::context::Context::Input(input) => Ok(input),
        _ => Err(ffmpeg_next::Error::InvalidData),
    }
}

/// Strips per-row stride padding from an RGB24 frame.
fn packed_rgb(frame: &ffmpeg_next::util::frame::video::Video, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width as usize * 3;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}

impl FrameProducer for FfmpegFrameStream {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }
        if self.flushing {
            return Ok(None);
        }
        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                return self.try_receive();
            };
            if stream.index() != self.video_stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn pacing(&self) -> Option<Duration> {
        self.pacing
    }
}
