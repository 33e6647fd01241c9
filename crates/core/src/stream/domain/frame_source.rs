use thiserror::Error;

use super::feed::FeedReader;
use super::source_descriptor::SourceDescriptor;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Please enter a stream URL")]
    Empty,
    #[error("cannot open {source_name}: {reason}")]
    Open { source_name: String, reason: String },
    #[error("source request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unsupported content type {0:?}")]
    UnsupportedContent(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

impl SourceError {
    pub fn open(descriptor: &SourceDescriptor, reason: impl std::fmt::Display) -> Self {
        Self::Open {
            source_name: descriptor.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Acquires frame sources.
///
/// `start` returns only once the source is open (or has failed to open);
/// frames then arrive on the handle's feed from a background producer.
pub trait FrameSource: Send {
    fn start(&mut self, descriptor: &SourceDescriptor) -> Result<Box<dyn SourceHandle>, SourceError>;
}

/// A running source.
pub trait SourceHandle: Send {
    /// A reader of the newest decoded frame and the feed status.
    fn feed(&self) -> FeedReader;

    fn descriptor(&self) -> &SourceDescriptor;

    /// Releases the source. The feed reports `Ended` afterwards.
    fn stop(self: Box<Self>);
}
