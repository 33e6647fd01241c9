use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::shared::frame::Frame;
use crate::shared::latest_slot::{latest_slot, SlotReader, SlotWriter};

/// Playback state of a frame source as seen by its consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedStatus {
    /// Acquired but no frame decoded yet.
    Pending = 0,
    Live = 1,
    Paused = 2,
    /// The source is exhausted or was released.
    Ended = 3,
}

impl FeedStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => FeedStatus::Live,
            2 => FeedStatus::Paused,
            3 => FeedStatus::Ended,
            _ => FeedStatus::Pending,
        }
    }
}

/// Creates the latest-frame channel between a source's decode thread and
/// its consumers (detection loop, compositor).
pub fn feed() -> (FeedWriter, FeedReader) {
    let (frames_tx, frames_rx) = latest_slot(None);
    let status = Arc::new(AtomicU8::new(FeedStatus::Pending as u8));
    (
        FeedWriter {
            frames: frames_tx,
            status: status.clone(),
        },
        FeedReader {
            frames: frames_rx,
            status,
        },
    )
}

pub struct FeedWriter {
    frames: SlotWriter<Option<Frame>>,
    status: Arc<AtomicU8>,
}

impl FeedWriter {
    /// Publishes a decoded frame and marks the feed live.
    pub fn push(&self, frame: Frame) {
        self.frames.publish(Some(frame));
        if self.status() == FeedStatus::Pending {
            self.set_status(FeedStatus::Live);
        }
    }

    pub fn set_status(&self, status: FeedStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn status(&self) -> FeedStatus {
        FeedStatus::from_u8(self.status.load(Ordering::Acquire))
    }
}

#[derive(Clone)]
pub struct FeedReader {
    frames: SlotReader<Option<Frame>>,
    status: Arc<AtomicU8>,
}

impl FeedReader {
    /// The most recent decoded frame, if any has arrived.
    pub fn latest_frame(&mut self) -> Arc<Option<Frame>> {
        self.frames.latest()
    }

    pub fn status(&self) -> FeedStatus {
        FeedStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// True while the source is producing frames.
    pub fn is_live(&self) -> bool {
        self.status() == FeedStatus::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0u8; 3], 1, 1, 3, index)
    }

    #[test]
    fn test_new_feed_is_pending_without_frame() {
        let (_writer, mut reader) = feed();
        assert_eq!(reader.status(), FeedStatus::Pending);
        assert!(reader.latest_frame().is_none());
        assert!(!reader.is_live());
    }

    #[test]
    fn test_first_push_goes_live() {
        let (writer, mut reader) = feed();
        writer.push(frame(0));
        assert!(reader.is_live());
        assert_eq!(reader.latest_frame().as_ref().as_ref().unwrap().index(), 0);
    }

    #[test]
    fn test_push_does_not_revive_paused_feed() {
        let (writer, reader) = feed();
        writer.push(frame(0));
        writer.set_status(FeedStatus::Paused);
        writer.push(frame(1));
        assert_eq!(reader.status(), FeedStatus::Paused);
    }

    #[test]
    fn test_reader_sees_newest_frame() {
        let (writer, mut reader) = feed();
        for i in 0..5 {
            writer.push(frame(i));
        }
        let latest = reader.latest_frame();
        assert_eq!(latest.as_ref().as_ref().map(Frame::index), Some(4));
    }

    #[test]
    fn test_ended_status_visible_to_clones() {
        let (writer, reader) = feed();
        let other = reader.clone();
        writer.set_status(FeedStatus::Ended);
        assert_eq!(other.status(), FeedStatus::Ended);
    }
}
