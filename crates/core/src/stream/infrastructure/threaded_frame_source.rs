use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::shared::frame::Frame;
use crate::stream::domain::feed::{feed, FeedReader, FeedStatus, FeedWriter};
use crate::stream::domain::frame_source::{FrameSource, SourceError, SourceHandle};
use crate::stream::domain::source_descriptor::SourceDescriptor;

use super::ffmpeg_frame_stream::FfmpegFrameStream;
use super::mjpeg_frame_stream::MjpegFrameStream;
use super::still_image_stream::StillImageStream;

/// Pulls decoded frames from one opened source.
pub trait FrameProducer: Send {
    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Minimum spacing between frames; `None` means as fast as produced.
    fn pacing(&self) -> Option<Duration>;
}

pub type ProducerOpener =
    Box<dyn Fn(&SourceDescriptor) -> Result<Box<dyn FrameProducer>, SourceError> + Send>;

/// How long `stop` waits for a blocked read before detaching the thread.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Runs each source's producer on its own thread, publishing into a feed.
pub struct ThreadedFrameSource {
    opener: ProducerOpener,
}

impl ThreadedFrameSource {
    pub fn new() -> Self {
        Self::with_opener(Box::new(open_producer))
    }

    pub fn with_opener(opener: ProducerOpener) -> Self {
        Self { opener }
    }
}

impl Default for ThreadedFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the decoder for a descriptor.
pub fn open_producer(descriptor: &SourceDescriptor) -> Result<Box<dyn FrameProducer>, SourceError> {
    Ok(match descriptor {
        SourceDescriptor::ImagePush(url) => Box::new(MjpegFrameStream::connect(url)?),
        SourceDescriptor::File(path) if descriptor.is_still_image() => {
            Box::new(StillImageStream::open(path)?)
        }
        _ => Box::new(FfmpegFrameStream::open(descriptor)?),
    })
}

impl FrameSource for ThreadedFrameSource {
    fn start(&mut self, descriptor: &SourceDescriptor) -> Result<Box<dyn SourceHandle>, SourceError> {
        let producer = (self.opener)(descriptor)?;
        let (writer, reader) = feed();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let name = descriptor.to_string();

        let thread = thread::Builder::new()
            .name("frame-source".into())
            .spawn(move || produce(producer, writer, &thread_stop, &name))
            .map_err(|e| SourceError::open(descriptor, e))?;

        log::info!("Started {descriptor}");
        Ok(Box::new(ThreadedSourceHandle {
            descriptor: descriptor.clone(),
            reader,
            stop,
            thread: Some(thread),
        }))
    }
}

fn produce(mut producer: Box<dyn FrameProducer>, writer: FeedWriter, stop: &AtomicBool, name: &str) {
    let mut produced = 0usize;
    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();
        match producer.next_frame() {
            Ok(Some(frame)) => {
                writer.push(frame);
                produced += 1;
            }
            Ok(None) => {
                log::info!("{name} ended after {produced} frames");
                break;
            }
            Err(e) => {
                log::warn!("{name} failed after {produced} frames: {e}");
                break;
            }
        }
        if let Some(interval) = producer.pacing() {
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                thread::park_timeout(rest);
            }
        }
    }
    writer.set_status(FeedStatus::Ended);
}

struct ThreadedSourceHandle {
    descriptor: SourceDescriptor,
    reader: FeedReader,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadedSourceHandle {
    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return;
        };
        thread.thread().unpark();
        let deadline = Instant::now() + STOP_GRACE;
        while !thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if thread.is_finished() {
            let _ = thread.join();
        } else {
            log::debug!("{} is blocked in a read; detaching", self.descriptor);
        }
    }
}

impl SourceHandle for ThreadedSourceHandle {
    fn feed(&self) -> FeedReader {
        self.reader.clone()
    }

    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn stop(mut self: Box<Self>) {
        self.shutdown();
        log::info!("Stopped {}", self.descriptor);
    }
}

impl Drop for ThreadedSourceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
