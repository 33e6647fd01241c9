use std::fmt;
use std::path::{Path, PathBuf};

use crate::shared::constants::{IMAGE_EXTENSIONS, IMAGE_PUSH_PATH};

use super::frame_source::SourceError;

/// Where frames come from, and therefore how they are consumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// A local camera, by platform device name (e.g. `/dev/video0`).
    CaptureDevice(String),
    /// A progressive stream decoded continuously (HLS, RTSP-over-HTTP, MP4).
    NetworkStream(String),
    /// An endpoint that pushes one picture at a time: an MJPEG multipart
    /// stream or a single image per request.
    ImagePush(String),
    /// A local video or image file.
    File(PathBuf),
}

impl SourceDescriptor {
    /// Classifies user input.
    ///
    /// HTTP URLs whose path contains `/video_feed` are push endpoints, other
    /// HTTP URLs are network streams. Anything that exists on disk is a file;
    /// everything else names a capture device.
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SourceError::Empty);
        }
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(if url_path(input).contains(IMAGE_PUSH_PATH) {
                Self::ImagePush(input.to_string())
            } else {
                Self::NetworkStream(input.to_string())
            });
        }
        let path = Path::new(input);
        if path.is_file() {
            return Ok(Self::File(path.to_path_buf()));
        }
        Ok(Self::CaptureDevice(input.to_string()))
    }

    /// True for files the `image` crate should decode as a still picture.
    pub fn is_still_image(&self) -> bool {
        match self {
            Self::File(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Live sources are consumed as fast as they produce; files are paced.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::File(_))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureDevice(name) => write!(f, "device {name}"),
            Self::NetworkStream(url) => write!(f, "stream {url}"),
            Self::ImagePush(url) => write!(f, "image feed {url}"),
            Self::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// The path component of an http(s) URL, without query or fragment.
fn url_path(url: &str) -> &str {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = after_scheme.find('/').map_or("", |i| &after_scheme[i..]);
    path.split(['?', '#']).next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::mjpeg("http://cam.local:5000/video_feed", true)]
    #[case::nested("https://host/api/video_feed/1?x=2", true)]
    #[case::plain_stream("https://example.com/live.m3u8", false)]
    #[case::query_only("http://host/live?next=/video_feed", false)]
    fn test_http_classification(#[case] url: &str, #[case] push: bool) {
        let parsed = SourceDescriptor::parse(url).unwrap();
        if push {
            assert_eq!(parsed, SourceDescriptor::ImagePush(url.to_string()));
        } else {
            assert_eq!(parsed, SourceDescriptor::NetworkStream(url.to_string()));
        }
        assert!(parsed.is_live());
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn test_empty_rejected(#[case] input: &str) {
        let err = SourceDescriptor::parse(input).unwrap_err();
        assert!(matches!(err, SourceError::Empty));
        assert_eq!(err.to_string(), "Please enter a stream URL");
    }

    #[test]
    fn test_existing_file_and_image_detection() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        let picture = dir.path().join("still.JPG");
        std::fs::write(&video, b"x").unwrap();
        std::fs::write(&picture, b"x").unwrap();

        let v = SourceDescriptor::parse(video.to_str().unwrap()).unwrap();
        let p = SourceDescriptor::parse(picture.to_str().unwrap()).unwrap();
        assert_eq!(v, SourceDescriptor::File(video));
        assert!(!v.is_still_image());
        assert!(!v.is_live());
        assert!(p.is_still_image());
    }

    #[test]
    fn test_unknown_name_is_capture_device() {
        assert_eq!(
            SourceDescriptor::parse("/dev/video7-not-here").unwrap(),
            SourceDescriptor::CaptureDevice("/dev/video7-not-here".into())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SourceDescriptor::ImagePush("http://h/video_feed".into()).to_string(),
            "image feed http://h/video_feed"
        );
    }
}
